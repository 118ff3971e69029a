#[cfg(feature = "desktop")]
pub mod camera;
pub mod config;
pub mod detection;
pub mod frame;
pub mod geometry;
pub mod model;
pub mod pose;
