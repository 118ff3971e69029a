use std::time::Duration;

use thiserror::Error;

use crate::frame::VideoFrame;
use crate::pose::RawPose;

/// Errors surfaced by a pose backend or by the lifecycle manager around it.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("model is not loaded")]
    NotLoaded,
    #[error("model load failed: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("segmentation graph failure: {0}")]
    Segmentation(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference worker disconnected")]
    Disconnected,
}

/// Error classification the recovery logic matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Inference,
    Segmentation,
    Timeout,
    Disconnected,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotLoaded | Self::Load(_) => ErrorKind::Load,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Segmentation(_) => ErrorKind::Segmentation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Disconnected => ErrorKind::Disconnected,
        }
    }
}

/// Narrow seam over the ML pose-estimation runtime.
///
/// The lifecycle manager drives everything through this trait, so the
/// cleanup and recovery policies can be exercised against fakes that
/// report synthetic tensor counts.
pub trait PoseBackend: Send {
    fn load(&mut self) -> Result<(), BackendError>;

    fn detect(&mut self, frame: &VideoFrame) -> Result<RawPose, BackendError>;

    /// Number of intermediate native buffers currently held by the runtime.
    /// Grows with every inference call until `release_tensors` runs.
    fn tensor_count(&self) -> usize;

    fn release_tensors(&mut self);

    /// Toggle the optional segmentation head. Disabled by the manager when a
    /// segmentation graph failure is detected.
    fn set_segmentation(&mut self, enabled: bool);

    fn dispose(&mut self);
}
