pub mod angles;
pub mod biomarkers;
pub mod keypoint;

pub use angles::{compute_body_angles, BodyAngles};
pub use biomarkers::{extract_biomarkers, MotionBiomarkers};
pub use keypoint::{map_keypoints, Keypoint, KeypointIndex, KeypointSet, RawKeypoint, RawPose};
