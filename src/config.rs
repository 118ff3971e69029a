use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// モデルロードのタイムアウト（ミリ秒）
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// 1フレーム推論のタイムアウト（ミリ秒）
    #[serde(default = "default_detection_timeout_ms")]
    pub detection_timeout_ms: u64,
    /// 何回の検出ごとにバッファを解放するか
    #[serde(default = "default_cleanup_interval_frames")]
    pub cleanup_interval_frames: u32,
    /// このバッファ数を超えたら解放する
    #[serde(default = "default_tensor_count_threshold")]
    pub tensor_count_threshold: usize,
    /// ロード失敗の再試行上限
    #[serde(default = "default_max_load_attempts")]
    pub max_load_attempts: u32,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_load_timeout_ms() -> u64 { 15_000 }
fn default_detection_timeout_ms() -> u64 { 3_000 }
fn default_cleanup_interval_frames() -> u32 { 5 }
fn default_tensor_count_threshold() -> usize { 100 }
fn default_max_load_attempts() -> u32 { 3 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            load_timeout_ms: default_load_timeout_ms(),
            detection_timeout_ms: default_detection_timeout_ms(),
            cleanup_interval_frames: default_cleanup_interval_frames(),
            tensor_count_threshold: default_tensor_count_threshold(),
            max_load_attempts: default_max_load_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// キーポイントを採用する信頼度の閾値
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// 検出ループの目標フレームレート
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_min_confidence() -> f32 { 0.5 }
fn default_target_fps() -> u32 { 30 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            target_fps: default_target_fps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// カメラインデックス（デフォルトカメラ: 0）
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが無ければデフォルト値で起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }
}
