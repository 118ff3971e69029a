pub mod backend;
pub mod manager;
pub mod onnx;

pub use backend::{BackendError, ErrorKind, PoseBackend};
pub use manager::{ModelManager, ModelState};
pub use onnx::OnnxBackend;
