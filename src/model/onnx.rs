use std::path::{Path, PathBuf};

use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::frame::VideoFrame;
use crate::pose::{KeypointIndex, RawKeypoint, RawPose};

use super::backend::{BackendError, PoseBackend};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: usize = 192;

/// MoveNet Lightning (ONNX) を使用した姿勢検出バックエンド
///
/// 入力: [1, 192, 192, 3] の f32 テンソル (0.0-255.0)
/// 出力: [1, 1, 17, 3] (y, x, confidence)、座標は正規化済み
pub struct OnnxBackend {
    model_path: PathBuf,
    session: Option<Session>,
    segmentation_enabled: bool,
    // ランタイムが推論ごとに溜める中間バッファの近似。ortはアリーナの
    // 内部状態を公開しないため、解放までに実行した推論回数で数える
    live_tensors: usize,
}

impl OnnxBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            session: None,
            segmentation_enabled: true,
            live_tensors: 0,
        }
    }

    /// フレームをMoveNet入力テンソルに変換（最近傍リサイズ、RGB、0-255）
    fn preprocess(frame: &VideoFrame) -> Array4<f32> {
        let size = MOVENET_INPUT_SIZE;
        let (src_h, src_w, _) = frame.pixels.dim();
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

        for y in 0..size {
            let src_y = (y * src_h / size).min(src_h.saturating_sub(1));
            for x in 0..size {
                let src_x = (x * src_w / size).min(src_w.saturating_sub(1));
                for c in 0..3 {
                    tensor[[0, y, x, c]] = frame.pixels[[src_y, src_x, c]] as f32;
                }
            }
        }

        tensor
    }

}

/// 推論エラーの分類。セグメンテーション系の失敗は復旧経路（フラグ無効化
/// +リロード）の対象。既にフラグが無効なら通常の推論エラーとして扱う
fn classify(segmentation_enabled: bool, err: ort::Error) -> BackendError {
    let message = err.to_string();
    if segmentation_enabled && message.to_ascii_lowercase().contains("segmentation") {
        BackendError::Segmentation(message)
    } else {
        BackendError::Inference(message)
    }
}

impl PoseBackend for OnnxBackend {
    fn load(&mut self) -> Result<(), BackendError> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.commit_from_file(&self.model_path))
            .map_err(|err| BackendError::Load(err.to_string()))?;
        self.session = Some(session);
        Ok(())
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<RawPose, BackendError> {
        let segmentation_enabled = self.segmentation_enabled;
        let session = self.session.as_mut().ok_or(BackendError::NotLoaded)?;

        let input = Self::preprocess(frame);
        let input_tensor =
            Tensor::from_array(input).map_err(|err| BackendError::Inference(err.to_string()))?;
        let outputs = session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .map_err(|err| classify(segmentation_enabled, err))?;
        self.live_tensors += 1;

        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .map_err(|err| BackendError::Inference(err.to_string()))?;

        // 正規化座標をフレームのピクセル座標へ戻す
        let mut keypoints = Vec::with_capacity(KeypointIndex::COUNT);
        let mut score_sum = 0.0f32;
        for i in 0..KeypointIndex::COUNT {
            let part = KeypointIndex::from_index(i)
                .ok_or_else(|| BackendError::Inference(format!("keypoint index {i} out of range")))?;
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let score = output[[0, 0, i, 2]];
            score_sum += score;
            keypoints.push(RawKeypoint {
                part,
                x: x * frame.width as f32,
                y: y * frame.height as f32,
                z: 0.0,
                score,
            });
        }

        Ok(RawPose {
            score: score_sum / KeypointIndex::COUNT as f32,
            keypoints,
        })
    }

    fn tensor_count(&self) -> usize {
        self.live_tensors
    }

    fn release_tensors(&mut self) {
        self.live_tensors = 0;
    }

    fn set_segmentation(&mut self, enabled: bool) {
        // MoveNetにセグメンテーションヘッドは無いが、フラグは保持して
        // マスク付きモデルへ差し替えた際の復旧経路と互換にしておく
        self.segmentation_enabled = enabled;
    }

    fn dispose(&mut self) {
        self.session = None;
        self.live_tensors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_range() {
        let mut frame = VideoFrame::blank(640, 480);
        frame.pixels.fill(200);
        let tensor = OnnxBackend::preprocess(&frame);
        assert_eq!(
            tensor.dim(),
            (1, MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE, 3)
        );
        assert_eq!(tensor[[0, 0, 0, 0]], 200.0);
        assert_eq!(
            tensor[[0, MOVENET_INPUT_SIZE - 1, MOVENET_INPUT_SIZE - 1, 2]],
            200.0
        );
    }

    #[test]
    fn test_detect_without_load_fails() {
        let mut backend = OnnxBackend::new("models/does_not_exist.onnx");
        let frame = VideoFrame::blank(192, 192);
        let result = backend.detect(&frame);
        assert!(matches!(result, Err(BackendError::NotLoaded)));
    }

    #[test]
    fn test_dispose_clears_tensors() {
        let mut backend = OnnxBackend::new("models/does_not_exist.onnx");
        backend.live_tensors = 42;
        backend.dispose();
        assert_eq!(backend.tensor_count(), 0);
        assert!(backend.session.is_none());
    }
}
