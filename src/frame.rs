use ndarray::Array3;

/// RGBフレーム (HWC、u8)
///
/// カメラ等のフレームソースが生成し、検出ループが「現在のフレーム」として
/// サンプリングする。フレームはキューに積まれない。推論が遅い場合は
/// 同じフレームが再取得されるだけで、バックログは発生しない。
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pixels: Array3<u8>,
    pub width: u32,
    pub height: u32,
}

impl VideoFrame {
    pub fn new(pixels: Array3<u8>) -> Self {
        let (h, w, _) = pixels.dim();
        Self {
            width: w as u32,
            height: h as u32,
            pixels,
        }
    }

    /// ウォームアップ推論などに使う黒フレーム
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: Array3::zeros((height as usize, width as usize, 3)),
            width,
            height,
        }
    }

    /// 有効な寸法を持つか
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// フレーム供給元（カメラキャプチャ等の外部コンポーネント）
///
/// `None` は「一時停止中・終了済み・準備未完了」を意味する。これは
/// エラーではなく頻繁に起こる正常系で、検出ループはそのサイクルを
/// スキップして次をスケジュールする。
pub trait FrameSource {
    fn poll_frame(&mut self) -> Option<VideoFrame>;
}
