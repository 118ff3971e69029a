use anyhow::{Context, Result};
use ndarray::Array3;
use opencv::{
    core::{AlgorithmHint, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::frame::{FrameSource, VideoFrame};

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// カメラを開く（デフォルトカメラ: index 0）
    pub fn open(index: i32) -> Result<Self> {
        Self::open_with_config(index, None, None, Some(60))
    }

    /// 解像度とFPSを指定してカメラを開く
    pub fn open_with_config(
        index: i32,
        width: Option<u32>,
        height: Option<u32>,
        fps: Option<u32>,
    ) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        // 解像度を設定
        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        if let Some(f) = fps {
            capture.set(videoio::CAP_PROP_FPS, f as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込んでRGBフレームに変換する
    pub fn read_frame(&mut self) -> Result<VideoFrame> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        mat_to_frame(&frame)
    }
}

/// BGRのMatをRGBのVideoFrameへ変換
fn mat_to_frame(mat: &Mat) -> Result<VideoFrame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(
        mat,
        &mut rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let height = rgb.rows() as usize;
    let width = rgb.cols() as usize;
    let bytes = rgb.data_bytes()?;
    let step = rgb.mat_step().get(0);

    let mut data = Vec::with_capacity(height * width * 3);
    for y in 0..height {
        data.extend_from_slice(&bytes[y * step..y * step + width * 3]);
    }

    let pixels = Array3::from_shape_vec((height, width, 3), data)
        .context("Frame buffer size mismatch")?;
    Ok(VideoFrame::new(pixels))
}

/// 別スレッドでカメラキャプチャを行い、最新フレームだけを保持する
///
/// フレームはキューに積まれない。検出ループはpoll_frameで「現在の
/// フレーム」をサンプリングし、推論が遅くてもバックログは発生しない。
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    frame_id: Arc<AtomicU64>,
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    _handle: thread::JoinHandle<()>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mut camera = OpenCvCamera::open_with_config(index, width, height, Some(60))?;
        let (w, h) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<VideoFrame>));
        let latest_ref = latest.clone();
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = frame_id.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = running.clone();

        let handle = thread::spawn(move || {
            while running_ref.load(Ordering::Acquire) {
                if let Ok(frame) = camera.read_frame() {
                    *latest_ref.lock().unwrap() = Some(frame);
                    frame_id_ref.fetch_add(1, Ordering::Release);
                }
            }
        });

        Ok(Self {
            latest,
            frame_id,
            paused: Arc::new(AtomicBool::new(false)),
            running,
            width: w,
            height: h,
            _handle: handle,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 現在のフレームIDを取得。新フレームが到着するたびにインクリメントされる。
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 一時停止。poll_frameがNoneを返すようになる（キャプチャ自体は継続）
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl FrameSource for ThreadedCamera {
    /// 最新フレームを取得。カメラスレッドが新フレームを書き込むまで同じ
    /// フレームが返る。初回フレーム到着前と一時停止中はNone。
    fn poll_frame(&mut self) -> Option<VideoFrame> {
        if self.paused.load(Ordering::Acquire) {
            return None;
        }
        self.latest.lock().unwrap().clone()
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
