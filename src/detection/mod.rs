pub mod pump;

pub use pump::{FramePump, IntervalPump};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::config::DetectionConfig;
use crate::frame::FrameSource;
use crate::model::ModelManager;
use crate::pose::{
    compute_body_angles, extract_biomarkers, map_keypoints, BodyAngles, MotionBiomarkers, RawPose,
};

/// Consecutive failed frames before a sustained-failure warning is logged.
/// Sustained failures never stop the loop; they only become visible.
const SUSTAINED_FAILURE_WARN_AFTER: u32 = 30;

/// Published per-session detection status. The detection loop is the sole
/// writer; consumers read snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionStatus {
    pub is_detecting: bool,
    /// Rolling one-second window frame rate.
    pub fps: Option<f32>,
    /// Overall confidence of the last detected pose.
    pub confidence: Option<f32>,
    /// Keypoints that passed the confidence filter on the last frame.
    pub detected_keypoints: usize,
    pub last_detection_time: Option<Instant>,
    pub consecutive_failures: u32,
}

/// Cloneable stop handle; lets callbacks or another owner stop the loop.
/// The flag flip is immediate, an in-flight inference finishes on the worker
/// and its result is discarded.
#[derive(Clone)]
pub struct LoopHandle {
    active: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_detecting(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Outcome of one scheduled cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Detection is not active; nothing ran.
    Inactive,
    /// Frame source paused or not ready; normal, the loop keeps scheduling.
    Skipped,
    Detected,
    /// Detection failed for this frame; recovered by skipping it.
    Failed,
}

type PoseCallback = Box<dyn FnMut(&RawPose)>;
type AngleCallback = Box<dyn FnMut(&BodyAngles, &MotionBiomarkers)>;

/// Continuous capture → detect → compute → publish cycle.
///
/// Owns the model manager and all published outputs. One cycle runs per
/// frame-pump slot; every cycle re-schedules regardless of success, failure
/// or skip, so a single bad frame can never stall the session.
pub struct DetectionLoop {
    manager: ModelManager,
    min_confidence: f32,
    active: Arc<AtomicBool>,
    status: DetectionStatus,
    angles: Option<BodyAngles>,
    biomarkers: Option<MotionBiomarkers>,
    last_pose: Option<RawPose>,
    frames_in_window: u32,
    window_start: Option<Instant>,
    on_pose: Option<PoseCallback>,
    on_angles: Option<AngleCallback>,
}

impl DetectionLoop {
    pub fn new(manager: ModelManager, config: &DetectionConfig) -> Self {
        Self {
            manager,
            min_confidence: config.min_confidence,
            active: Arc::new(AtomicBool::new(false)),
            status: DetectionStatus::default(),
            angles: None,
            biomarkers: None,
            last_pose: None,
            frames_in_window: 0,
            window_start: None,
            on_pose: None,
            on_angles: None,
        }
    }

    /// Access the owned model manager (loading, explicit retry, reset).
    pub fn manager(&mut self) -> &mut ModelManager {
        &mut self.manager
    }

    pub fn on_pose(&mut self, callback: impl FnMut(&RawPose) + 'static) {
        self.on_pose = Some(Box::new(callback));
    }

    pub fn on_angles(&mut self, callback: impl FnMut(&BodyAngles, &MotionBiomarkers) + 'static) {
        self.on_angles = Some(Box::new(callback));
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            active: self.active.clone(),
        }
    }

    /// Snapshot of the published status.
    pub fn status(&self) -> DetectionStatus {
        let mut status = self.status.clone();
        status.is_detecting = self.active.load(Ordering::Acquire);
        status
    }

    pub fn angles(&self) -> Option<&BodyAngles> {
        self.angles.as_ref()
    }

    pub fn biomarkers(&self) -> Option<&MotionBiomarkers> {
        self.biomarkers.as_ref()
    }

    pub fn last_pose(&self) -> Option<&RawPose> {
        self.last_pose.as_ref()
    }

    /// Begin detection. Fails fast when the model is not ready, instead of
    /// silently queueing work behind a load.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if !self.manager.is_ready() {
            anyhow::bail!("pose model is not loaded");
        }
        self.active.store(true, Ordering::Release);
        self.frames_in_window = 0;
        self.window_start = None;
        Ok(())
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Stop and clear all published outputs back to their initial state.
    /// Idempotent.
    pub fn reset(&mut self) {
        self.stop();
        self.status = DetectionStatus::default();
        self.angles = None;
        self.biomarkers = None;
        self.last_pose = None;
        self.frames_in_window = 0;
        self.window_start = None;
    }

    /// Run one scheduled cycle: sample the current frame, detect, compute,
    /// publish. Frame-level failures are recovered by skipping the frame.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> TickOutcome {
        if !self.active.load(Ordering::Acquire) {
            return TickOutcome::Inactive;
        }

        let outcome = match source.poll_frame() {
            None => TickOutcome::Skipped,
            Some(frame) if !frame.is_valid() => TickOutcome::Skipped,
            Some(frame) => match self.manager.detect(frame) {
                Some(pose) => {
                    self.publish(pose);
                    TickOutcome::Detected
                }
                None => {
                    self.record_failure();
                    TickOutcome::Failed
                }
            },
        };

        self.update_fps();
        outcome
    }

    /// Drive the loop until it is stopped or the pump closes.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        pump: &mut dyn FramePump,
    ) -> anyhow::Result<()> {
        self.start()?;
        while self.active.load(Ordering::Acquire) {
            if !pump.next_frame() {
                break;
            }
            self.tick(source);
        }
        self.stop();
        Ok(())
    }

    fn publish(&mut self, pose: RawPose) {
        let keypoints = map_keypoints(&pose.keypoints, self.min_confidence);
        let angles = compute_body_angles(&keypoints);
        let biomarkers = extract_biomarkers(&angles, Some(pose.score));

        self.status.confidence = Some(pose.score);
        self.status.detected_keypoints = keypoints.len();
        self.status.last_detection_time = Some(Instant::now());
        self.status.consecutive_failures = 0;

        if let Some(callback) = self.on_pose.as_mut() {
            callback(&pose);
        }
        if let Some(callback) = self.on_angles.as_mut() {
            callback(&angles, &biomarkers);
        }

        self.angles = Some(angles);
        self.biomarkers = Some(biomarkers);
        self.last_pose = Some(pose);
    }

    fn record_failure(&mut self) {
        self.status.consecutive_failures += 1;
        if self.status.consecutive_failures == SUSTAINED_FAILURE_WARN_AFTER {
            warn!(
                "{} consecutive frames without a detection",
                self.status.consecutive_failures
            );
        }
    }

    fn update_fps(&mut self) {
        self.frames_in_window += 1;
        let start = *self.window_start.get_or_insert_with(Instant::now);
        let elapsed = start.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            self.status.fps = Some(self.frames_in_window as f32 / elapsed);
            self.frames_in_window = 0;
            self.window_start = Some(Instant::now());
        }
    }
}
