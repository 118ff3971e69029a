use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::ModelConfig;
use crate::frame::VideoFrame;
use crate::pose::RawPose;

use super::backend::{BackendError, ErrorKind, PoseBackend};

/// Model lifecycle state.
///
/// `load_attempts` resets to 0 on success and after the retry ceiling is
/// hit, so an explicit user-triggered retry starts with a clean slate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelState {
    pub loaded: bool,
    pub loading: bool,
    pub load_attempts: u32,
    pub last_error: Option<ErrorKind>,
}

enum Command {
    Load(u64),
    Detect(u64, VideoFrame),
    Release,
    SetSegmentation(bool),
    Dispose,
    Shutdown,
}

enum Reply {
    Loaded(u64, Result<(), BackendError>),
    Detected(u64, Result<RawPose, BackendError>, usize),
}

/// Owns the pose backend on a dedicated worker thread and manages its
/// lifecycle: load with retry and timeout, warm-up, per-frame detection
/// with timeout, periodic native-buffer release, and recovery from
/// segmentation graph failures.
///
/// Commands are serialized through a channel, so at most one inference is
/// in flight at any time. Replies carry a generation tag; a reply arriving
/// after its call timed out is discarded as stale.
pub struct ModelManager {
    commands: Sender<Command>,
    replies: Receiver<Reply>,
    config: ModelConfig,
    state: ModelState,
    generation: u64,
    detections_since_cleanup: u32,
    last_tensor_count: usize,
}

impl ModelManager {
    pub fn new(backend: Box<dyn PoseBackend>, config: ModelConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        thread::spawn(move || worker_loop(backend, command_rx, reply_tx));
        Self {
            commands: command_tx,
            replies: reply_rx,
            config,
            state: ModelState::default(),
            generation: 0,
            detections_since_cleanup: 0,
            last_tensor_count: 0,
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.loaded
    }

    /// Load the model. Idempotent: returns immediately when already loaded.
    ///
    /// Retries silently up to `max_load_attempts`, each attempt bounded by
    /// `load_timeout_ms`. Every failed attempt disposes the backend so a
    /// half-initialized session can never pass a later `is_ready` check.
    /// After success the session is warmed up with one inference and the
    /// accumulated buffers are force-released.
    pub fn load(&mut self) -> bool {
        if self.state.loaded {
            return true;
        }
        self.state.loading = true;
        let timeout = Duration::from_millis(self.config.load_timeout_ms);

        while self.state.load_attempts < self.config.max_load_attempts {
            self.state.load_attempts += 1;
            match self.request_load(timeout) {
                Ok(()) => {
                    self.state.loaded = true;
                    self.state.loading = false;
                    self.state.load_attempts = 0;
                    self.state.last_error = None;
                    self.warm_up();
                    self.cleanup(true);
                    return true;
                }
                Err(err) => {
                    warn!(
                        "model load attempt {}/{} failed: {}",
                        self.state.load_attempts, self.config.max_load_attempts, err
                    );
                    self.state.last_error = Some(err.kind());
                    self.send(Command::Dispose);
                    self.send(Command::Release);
                }
            }
        }

        self.state.loading = false;
        self.state.loaded = false;
        self.state.load_attempts = 0;
        false
    }

    /// Run one inference. Returns `None` when the model is not ready or the
    /// frame failed; per-frame failures are recovered locally and must never
    /// take down the session.
    pub fn detect(&mut self, frame: VideoFrame) -> Option<RawPose> {
        if !self.state.loaded {
            return None;
        }
        // Release buffers that came due before dispatching the next inference.
        self.cleanup(false);

        match self.request_detect(frame) {
            Ok(pose) => {
                self.detections_since_cleanup += 1;
                Some(pose)
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::Segmentation => {
                        warn!("segmentation failure during inference, disabling segmentation and reloading: {err}");
                        self.send(Command::SetSegmentation(false));
                        self.reset();
                        self.load();
                    }
                    _ => {
                        warn!("detection failed: {err}");
                        self.cleanup(true);
                    }
                }
                self.state.last_error = Some(err.kind());
                None
            }
        }
    }

    /// Release accumulated native buffers when due, or unconditionally with
    /// `force`. Due means `cleanup_interval_frames` detections since the
    /// last release, or the backend's buffer count exceeding
    /// `tensor_count_threshold`.
    pub fn cleanup(&mut self, force: bool) {
        let due = self.detections_since_cleanup >= self.config.cleanup_interval_frames
            || self.last_tensor_count > self.config.tensor_count_threshold;
        if force || due {
            debug!(
                "releasing native buffers (force={force}, detections={}, tensors={})",
                self.detections_since_cleanup, self.last_tensor_count
            );
            self.send(Command::Release);
            self.detections_since_cleanup = 0;
            self.last_tensor_count = 0;
        }
    }

    /// Full teardown: release buffers, dispose the backend, reset attempt
    /// counters and state.
    pub fn reset(&mut self) {
        self.send(Command::Release);
        self.send(Command::Dispose);
        self.state = ModelState::default();
        self.detections_since_cleanup = 0;
        self.last_tensor_count = 0;
    }

    fn warm_up(&mut self) {
        let blank = VideoFrame::blank(192, 192);
        if let Err(err) = self.request_detect(blank) {
            debug!("warm-up inference failed (ignored): {err}");
        }
    }

    fn request_load(&mut self, timeout: Duration) -> Result<(), BackendError> {
        self.generation += 1;
        let generation = self.generation;
        self.send(Command::Load(generation));
        let deadline = Instant::now() + timeout;
        loop {
            match self.recv_until(deadline, timeout)? {
                Reply::Loaded(g, result) if g == generation => return result,
                // Stale reply from a call that already timed out; discard.
                _ => continue,
            }
        }
    }

    fn request_detect(&mut self, frame: VideoFrame) -> Result<RawPose, BackendError> {
        self.generation += 1;
        let generation = self.generation;
        let timeout = Duration::from_millis(self.config.detection_timeout_ms);
        self.send(Command::Detect(generation, frame));
        let deadline = Instant::now() + timeout;
        loop {
            match self.recv_until(deadline, timeout)? {
                Reply::Detected(g, result, tensors) if g == generation => {
                    self.last_tensor_count = tensors;
                    return result;
                }
                _ => continue,
            }
        }
    }

    fn recv_until(&self, deadline: Instant, timeout: Duration) -> Result<Reply, BackendError> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(BackendError::Timeout(timeout))?;
        match self.replies.recv_timeout(remaining) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(BackendError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(BackendError::Disconnected),
        }
    }

    fn send(&self, command: Command) {
        // Send fails only when the worker is gone; the next recv surfaces it.
        let _ = self.commands.send(command);
    }
}

impl Drop for ModelManager {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn worker_loop(
    mut backend: Box<dyn PoseBackend>,
    commands: Receiver<Command>,
    replies: Sender<Reply>,
) {
    for command in commands {
        match command {
            Command::Load(generation) => {
                let result = backend.load();
                let _ = replies.send(Reply::Loaded(generation, result));
            }
            Command::Detect(generation, frame) => {
                let result = backend.detect(&frame);
                let tensors = backend.tensor_count();
                let _ = replies.send(Reply::Detected(generation, result, tensors));
            }
            Command::Release => backend.release_tensors(),
            Command::SetSegmentation(enabled) => backend.set_segmentation(enabled),
            Command::Dispose => backend.dispose(),
            Command::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeShared {
        loads: AtomicU32,
        detects: AtomicU32,
        releases: AtomicU32,
        disposes: AtomicU32,
        fail_loads: AtomicU32,
        fail_detects: AtomicU32,
        segmentation_failures: AtomicU32,
        load_delay_ms: AtomicU64,
        detect_delay_ms: AtomicU64,
        tensors_per_detect: AtomicUsize,
        segmentation_enabled: AtomicBool,
        events: Mutex<Vec<&'static str>>,
    }

    impl FakeShared {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    struct FakeBackend {
        shared: Arc<FakeShared>,
        loaded: bool,
        tensors: usize,
    }

    impl FakeBackend {
        fn new(shared: Arc<FakeShared>) -> Self {
            shared.segmentation_enabled.store(true, Ordering::SeqCst);
            Self {
                shared,
                loaded: false,
                tensors: 0,
            }
        }
    }

    impl PoseBackend for FakeBackend {
        fn load(&mut self) -> Result<(), BackendError> {
            let delay = self.shared.load_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                thread::sleep(Duration::from_millis(delay));
            }
            self.shared.loads.fetch_add(1, Ordering::SeqCst);
            self.shared.push("load");
            if self.shared.fail_loads.load(Ordering::SeqCst) > 0 {
                self.shared.fail_loads.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::Load("synthetic load failure".into()));
            }
            self.loaded = true;
            Ok(())
        }

        fn detect(&mut self, _frame: &VideoFrame) -> Result<RawPose, BackendError> {
            let delay = self.shared.detect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                thread::sleep(Duration::from_millis(delay));
            }
            self.shared.detects.fetch_add(1, Ordering::SeqCst);
            self.shared.push("detect");
            if !self.loaded {
                return Err(BackendError::NotLoaded);
            }
            if self.shared.segmentation_failures.load(Ordering::SeqCst) > 0 {
                self.shared.segmentation_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::Segmentation("synthetic graph failure".into()));
            }
            if self.shared.fail_detects.load(Ordering::SeqCst) > 0 {
                self.shared.fail_detects.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::Inference("synthetic inference failure".into()));
            }
            self.tensors += self.shared.tensors_per_detect.load(Ordering::SeqCst);
            Ok(RawPose {
                keypoints: Vec::new(),
                score: 0.8,
            })
        }

        fn tensor_count(&self) -> usize {
            self.tensors
        }

        fn release_tensors(&mut self) {
            self.shared.releases.fetch_add(1, Ordering::SeqCst);
            self.shared.push("release");
            self.tensors = 0;
        }

        fn set_segmentation(&mut self, enabled: bool) {
            self.shared.segmentation_enabled.store(enabled, Ordering::SeqCst);
        }

        fn dispose(&mut self) {
            self.shared.disposes.fetch_add(1, Ordering::SeqCst);
            self.shared.push("dispose");
            self.loaded = false;
            self.tensors = 0;
        }
    }

    fn test_config() -> ModelConfig {
        ModelConfig {
            model_path: String::new(),
            load_timeout_ms: 1_000,
            detection_timeout_ms: 1_000,
            cleanup_interval_frames: 5,
            tensor_count_threshold: 100,
            max_load_attempts: 3,
        }
    }

    fn new_manager(config: ModelConfig) -> (ModelManager, Arc<FakeShared>) {
        let shared = Arc::new(FakeShared::default());
        let backend = FakeBackend::new(shared.clone());
        (ModelManager::new(Box::new(backend), config), shared)
    }

    fn frame() -> VideoFrame {
        VideoFrame::blank(4, 4)
    }

    #[test]
    fn test_load_success_and_idempotent() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        assert!(manager.is_ready());
        assert_eq!(manager.state().load_attempts, 0);
        assert_eq!(manager.state().last_error, None);
        // Second load is a no-op.
        assert!(manager.load());
        assert_eq!(shared.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_runs_warmup_and_forced_cleanup() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        // One warm-up inference, then a forced buffer release.
        assert_eq!(shared.detects.load(Ordering::SeqCst), 1);
        assert_eq!(shared.events(), vec!["load", "detect", "release"]);
    }

    #[test]
    fn test_load_retries_to_ceiling_then_fails() {
        let (mut manager, shared) = new_manager(test_config());
        shared.fail_loads.store(3, Ordering::SeqCst);
        assert!(!manager.load());
        assert_eq!(shared.loads.load(Ordering::SeqCst), 3);
        assert!(!manager.is_ready());
        // Attempts reset so an explicit retry starts fresh.
        assert_eq!(manager.state().load_attempts, 0);
        assert_eq!(manager.state().last_error, Some(ErrorKind::Load));
        // Every failed attempt disposed the backend.
        assert_eq!(shared.disposes.load(Ordering::SeqCst), 3);
        // An explicit retry succeeds once the failure cause is gone.
        assert!(manager.load());
        assert!(manager.is_ready());
    }

    #[test]
    fn test_load_timeout_counts_as_failure() {
        let mut config = test_config();
        config.load_timeout_ms = 50;
        config.max_load_attempts = 1;
        let (mut manager, shared) = new_manager(config);
        shared.load_delay_ms.store(300, Ordering::SeqCst);
        assert!(!manager.load());
        assert!(!manager.is_ready());
        assert_eq!(manager.state().last_error, Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_detect_requires_ready() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.detect(frame()).is_none());
        assert_eq!(shared.detects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cleanup_after_interval_before_next_detection() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        for _ in 0..5 {
            assert!(manager.detect(frame()).is_some());
        }
        // Only the post-load forced release so far.
        assert_eq!(shared.releases.load(Ordering::SeqCst), 1);

        // The 6th detection triggers a release before the inference runs.
        assert!(manager.detect(frame()).is_some());
        assert_eq!(shared.releases.load(Ordering::SeqCst), 2);
        let events = shared.events();
        assert_eq!(&events[events.len() - 2..], &["release", "detect"]);
    }

    #[test]
    fn test_cleanup_on_tensor_threshold() {
        let mut config = test_config();
        config.cleanup_interval_frames = 1_000;
        let (mut manager, shared) = new_manager(config);
        shared.tensors_per_detect.store(60, Ordering::SeqCst);
        assert!(manager.load());
        let base = shared.releases.load(Ordering::SeqCst);

        assert!(manager.detect(frame()).is_some()); // 60 tensors
        assert!(manager.detect(frame()).is_some()); // 120 tensors
        assert_eq!(shared.releases.load(Ordering::SeqCst), base);

        // 120 > 100: released before the next inference.
        assert!(manager.detect(frame()).is_some());
        assert_eq!(shared.releases.load(Ordering::SeqCst), base + 1);
    }

    #[test]
    fn test_segmentation_recovery_disables_and_reloads() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        shared.segmentation_failures.store(1, Ordering::SeqCst);

        // The failing frame yields no result but triggers recovery.
        assert!(manager.detect(frame()).is_none());
        assert!(!shared.segmentation_enabled.load(Ordering::SeqCst));
        assert_eq!(shared.loads.load(Ordering::SeqCst), 2);
        assert!(manager.is_ready());

        // Back to normal on the next frame.
        assert!(manager.detect(frame()).is_some());
    }

    #[test]
    fn test_detect_error_forces_cleanup() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        let base = shared.releases.load(Ordering::SeqCst);
        shared.fail_detects.store(1, Ordering::SeqCst);
        assert!(manager.detect(frame()).is_none());
        assert_eq!(manager.state().last_error, Some(ErrorKind::Inference));
        assert_eq!(shared.releases.load(Ordering::SeqCst), base + 1);
    }

    #[test]
    fn test_detect_timeout_discards_stale_result() {
        let mut config = test_config();
        config.detection_timeout_ms = 50;
        let (mut manager, shared) = new_manager(config);
        assert!(manager.load());

        shared.detect_delay_ms.store(200, Ordering::SeqCst);
        assert!(manager.detect(frame()).is_none());
        assert_eq!(manager.state().last_error, Some(ErrorKind::Timeout));

        // The stale reply from the timed-out frame must not be mistaken for
        // the next frame's result.
        shared.detect_delay_ms.store(0, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(250));
        assert!(manager.detect(frame()).is_some());
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut manager, shared) = new_manager(test_config());
        assert!(manager.load());
        assert!(manager.detect(frame()).is_some());

        manager.reset();
        assert_eq!(*manager.state(), ModelState::default());
        assert!(!manager.is_ready());
        assert!(manager.detect(frame()).is_none());
        assert!(shared.disposes.load(Ordering::SeqCst) >= 1);
    }
}
