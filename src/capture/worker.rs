use super::{CaptureError, CaptureSource, Frame};
use crate::metrics::Metrics;
use crate::models::CameraSettings;
use crate::signal::Signal;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Observable state of a [`CaptureWorker`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// The capture thread is alive but not consuming frames
    Paused,

    /// The capture thread is capturing and emitting frames
    Running,

    /// The capture thread has exited; terminal
    Stopped,
}

/// Errors returned by [`CaptureWorker`] operations
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to open capture target {target}: {source}")]
    OpenFailed {
        target: String,
        #[source]
        source: CaptureError,
    },

    #[error("Capture target {target} opened but failed to deliver a frame: {source}")]
    VerifyFailed {
        target: String,
        #[source]
        source: CaptureError,
    },

    #[error("Capture target {target} opened but produced no frame")]
    NoInitialFrame { target: String },

    #[error("Capture worker has been stopped")]
    Stopped,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Construction parameters for a [`CaptureWorker`]
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Name given to the capture thread
    pub thread_name: String,

    /// How long the capture thread waits after a failed or empty capture
    /// before trying again
    pub error_backoff: Duration,

    /// Counters shared with the rest of the application
    pub metrics: Arc<Metrics>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: "gazeview-capture".to_string(),
            error_backoff: Duration::from_millis(100),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

impl WorkerOptions {
    pub fn from_settings(settings: &CameraSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            error_backoff: Duration::from_millis(settings.error_backoff_ms),
            metrics,
            ..Self::default()
        }
    }
}

/// Pause/stop flags, guarded by `Shared::control` and signalled through
/// `Shared::wake`.
#[derive(Debug)]
struct Control {
    paused: bool,
    stopping: bool,

    /// A target has been opened and verified
    active: bool,
}

struct Device<S: CaptureSource> {
    source: S,
    target: Option<S::Target>,
}

struct Shared<S: CaptureSource> {
    control: Mutex<Control>,
    wake: Condvar,

    // Lock order: `device` before `control`.
    device: Mutex<Device<S>>,

    frames: Signal<Frame>,
    errors: Signal<CaptureError>,
    metrics: Arc<Metrics>,
    error_backoff: Duration,
}

impl<S: CaptureSource> Shared<S> {
    fn set_paused(&self, paused: bool) {
        let mut control = self.control.lock();
        control.paused = paused;
        self.wake.notify_all();
    }

    fn is_paused(&self) -> bool {
        let control = self.control.lock();
        control.paused || !control.active
    }

    /// Sleep for the backoff, waking early on stop.
    fn back_off(&self) {
        let mut control = self.control.lock();
        if !control.stopping {
            let _ = self
                .wake
                .wait_while_for(&mut control, |c| !c.stopping, self.error_backoff);
        }
    }

    fn emit_frame(&self, frame: Frame) {
        let emitted = panic::catch_unwind(AssertUnwindSafe(|| self.frames.emit(&frame)));
        if emitted.is_err() {
            self.metrics.record_handler_panic();
            error!(
                sequence = frame.sequence,
                "Frame subscriber panicked, continuing capture"
            );
        }
    }

    fn report_error(&self, err: CaptureError) {
        self.metrics.record_capture_error();
        warn!(error = %err, "Capture failed");
        let reported = panic::catch_unwind(AssertUnwindSafe(|| self.errors.emit(&err)));
        if reported.is_err() {
            self.metrics.record_handler_panic();
            error!("Capture error subscriber panicked");
        }
        self.back_off();
    }
}

/// Owns a capture source and the dedicated thread that reads from it.
///
/// The thread is spawned by [`new()`](Self::new) and starts out
/// [`Paused`](WorkerState::Paused). [`run()`](Self::run) opens a target,
/// verifies that it delivers a frame, and starts the capture loop. Each
/// captured frame is emitted on [`frames()`](Self::frames) from the capture
/// thread; capture failures are emitted on [`errors()`](Self::errors), logged,
/// and followed by a short backoff.
///
/// Dropping the worker stops the thread and waits for it to exit. The wait is
/// bounded by one in-flight capture call.
///
/// # Failed target switches
///
/// When `run()` fails, the previously active target is closed and forgotten:
/// [`target()`](Self::target) returns `None` and the worker stays paused until
/// a later `run()` succeeds.
///
/// # Example
/// ```
/// use gazeview::capture::{CaptureWorker, SyntheticCamera, WorkerState};
///
/// let worker = CaptureWorker::new(SyntheticCamera::new(8, 8))?;
/// assert_eq!(worker.state(), WorkerState::Paused);
///
/// worker.run(0)?;
/// assert_eq!(worker.state(), WorkerState::Running);
///
/// assert!(worker.run(42).is_err());
/// assert_eq!(worker.state(), WorkerState::Paused);
/// # Ok::<(), gazeview::capture::WorkerError>(())
/// ```
pub struct CaptureWorker<S: CaptureSource> {
    shared: Arc<Shared<S>>,
    thread: Option<JoinHandle<()>>,
}

impl<S: CaptureSource> CaptureWorker<S> {
    /// Spawn the capture thread with default options.
    pub fn new(source: S) -> Result<Self, WorkerError> {
        Self::with_options(source, WorkerOptions::default())
    }

    pub fn with_options(source: S, options: WorkerOptions) -> Result<Self, WorkerError> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                paused: true,
                stopping: false,
                active: false,
            }),
            wake: Condvar::new(),
            device: Mutex::new(Device {
                source,
                target: None,
            }),
            frames: Signal::new(),
            errors: Signal::new(),
            metrics: options.metrics,
            error_backoff: options.error_backoff,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(options.thread_name)
            .spawn(move || capture_loop(thread_shared))
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Open `target` and start capturing from it.
    ///
    /// If `target` is already open this only resumes. Otherwise the capture
    /// loop is paused, the old target is closed, `target` is opened and must
    /// deliver one frame straight away, and capture resumes. Other callers of
    /// `run`, `pause` and `resume` never see a half-configured target.
    ///
    /// On error the worker is left paused with no active target.
    pub fn run(&self, target: S::Target) -> Result<(), WorkerError> {
        if self.shared.control.lock().stopping {
            return Err(WorkerError::Stopped);
        }

        // Park the loop; once we hold the device it is not mid-capture.
        self.shared.set_paused(true);
        let mut device = self.shared.device.lock();

        if device.target.as_ref() == Some(&target) && device.source.is_open() {
            debug!(?target, "Capture target already open, resuming");
            return self.start_locked();
        }

        {
            let mut control = self.shared.control.lock();
            control.active = false;
        }
        if let Some(previous) = device.target.take() {
            debug!(?previous, "Closing capture target");
            device.source.close();
        }

        info!(?target, "Opening capture target");
        if let Err(source) = device.source.open(&target) {
            warn!(?target, error = %source, "Failed to open capture target");
            return Err(WorkerError::OpenFailed {
                target: format!("{target:?}"),
                source,
            });
        }

        match device.source.capture_one() {
            Ok(Some(frame)) if !frame.is_empty() => {
                debug!(?target, ?frame, "Capture target verified");
            }
            Ok(_) => {
                warn!(
                    ?target,
                    "Capture target opened but produced no frame; try another target"
                );
                device.source.close();
                return Err(WorkerError::NoInitialFrame {
                    target: format!("{target:?}"),
                });
            }
            Err(source) => {
                warn!(?target, error = %source, "Capture target failed verification");
                device.source.close();
                return Err(WorkerError::VerifyFailed {
                    target: format!("{target:?}"),
                    source,
                });
            }
        }

        device.target = Some(target);
        self.shared.metrics.record_target_switch();
        self.start_locked()
    }

    /// Stop consuming frames. The capture thread stays alive. Idempotent.
    pub fn pause(&self) {
        debug!("Pausing capture");
        self.shared.set_paused(true);
    }

    /// Resume capturing from the active target.
    ///
    /// Returns `false` without changing anything when no target has been
    /// opened yet or the worker is stopped.
    pub fn resume(&self) -> bool {
        let mut control = self.shared.control.lock();
        if control.stopping {
            return false;
        }
        if !control.active {
            debug!("Resume ignored, no capture target is open");
            return false;
        }
        control.paused = false;
        self.shared.wake.notify_all();
        true
    }

    pub fn state(&self) -> WorkerState {
        let control = self.shared.control.lock();
        if control.stopping {
            WorkerState::Stopped
        } else if control.paused || !control.active {
            WorkerState::Paused
        } else {
            WorkerState::Running
        }
    }

    /// The active target, if one is open.
    ///
    /// Waits for an in-flight capture to finish.
    pub fn target(&self) -> Option<S::Target> {
        self.shared.device.lock().target.clone()
    }

    /// Frames captured by the worker, emitted from the capture thread.
    pub fn frames(&self) -> &Signal<Frame> {
        &self.shared.frames
    }

    /// Capture failures, emitted from the capture thread.
    pub fn errors(&self) -> &Signal<CaptureError> {
        &self.shared.errors
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Stop the capture thread and wait for it to exit. Idempotent.
    ///
    /// When the last handle is dropped from a frame subscriber the capture
    /// thread cannot wait for itself; it is told to stop and left to exit on
    /// its own once the subscriber returns.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        {
            let mut control = self.shared.control.lock();
            control.stopping = true;
            self.shared.wake.notify_all();
        }

        if thread.thread().id() == thread::current().id() {
            warn!("Capture worker dropped on its own thread, not joining");
            return;
        }

        if thread.join().is_err() {
            error!("Capture thread terminated abnormally");
        }

        let mut device = self.shared.device.lock();
        if device.target.take().is_some() {
            device.source.close();
        }
        info!("Capture worker stopped");
    }

    /// Mark the (already verified) target active and unpause. Called with the
    /// device lock held so a concurrent `run` cannot interleave.
    fn start_locked(&self) -> Result<(), WorkerError> {
        let mut control = self.shared.control.lock();
        if control.stopping {
            return Err(WorkerError::Stopped);
        }
        control.active = true;
        control.paused = false;
        self.shared.wake.notify_all();
        Ok(())
    }
}

impl<S: CaptureSource> Drop for CaptureWorker<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_loop<S: CaptureSource>(shared: Arc<Shared<S>>) {
    debug!("Capture thread started");

    loop {
        {
            let mut control = shared.control.lock();
            shared.wake.wait_while(&mut control, |c| {
                (c.paused || !c.active) && !c.stopping
            });
            if control.stopping {
                break;
            }
        }

        let captured = {
            let mut device = shared.device.lock();

            // A run() may have paused us between the wait and the device lock.
            if shared.is_paused() {
                continue;
            }
            if !device.source.is_open() {
                Err(CaptureError::NotOpen)
            } else {
                device.source.capture_one()
            }
        };

        match captured {
            Ok(Some(frame)) if !frame.is_empty() => {
                trace!(sequence = frame.sequence, "Captured frame");
                shared.metrics.record_frame_captured();
                shared.emit_frame(frame);
            }
            // Empty frames are not emitted; the source gets the same pause as after an error.
            Ok(_) => {
                trace!("Capture returned no frame");
                shared.metrics.record_empty_frame();
                shared.back_off();
            }
            Err(err) => shared.report_error(err),
        }
    }

    debug!("Capture thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn counting(worker: &CaptureWorker<SyntheticCamera>) -> Arc<AtomicU64> {
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);
        let _ = worker.frames().connect(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_new_worker_is_paused() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        assert_eq!(worker.state(), WorkerState::Paused);
        assert_eq!(worker.target(), None);
    }

    #[test]
    fn test_run_delivers_frames() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        let count = counting(&worker);

        worker.run(0).unwrap();

        assert_eq!(worker.state(), WorkerState::Running);
        assert_eq!(worker.target(), Some(0));
        wait_until(|| count.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn test_run_unknown_device_fails_and_stays_paused() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();

        let err = worker.run(7).unwrap_err();

        assert!(matches!(err, WorkerError::OpenFailed { .. }));
        assert_eq!(worker.state(), WorkerState::Paused);
        assert_eq!(worker.target(), None);
    }

    #[test]
    fn test_blank_device_is_rejected() {
        let camera = SyntheticCamera::new(4, 4).with_blank_devices(&[3]);
        let worker = CaptureWorker::new(camera).unwrap();

        let err = worker.run(3).unwrap_err();

        assert!(matches!(err, WorkerError::NoInitialFrame { .. }));
        assert_eq!(worker.state(), WorkerState::Paused);
    }

    #[test]
    fn test_resume_without_target_is_ignored() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        assert!(!worker.resume());
        assert_eq!(worker.state(), WorkerState::Paused);
    }

    #[test]
    fn test_pause_and_resume() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        let count = counting(&worker);
        worker.run(0).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) > 0);

        worker.pause();
        worker.pause();
        assert_eq!(worker.state(), WorkerState::Paused);

        // Let an in-flight frame land, then the count must hold still.
        thread::sleep(Duration::from_millis(20));
        let paused_at = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), paused_at);

        assert!(worker.resume());
        wait_until(|| count.load(Ordering::SeqCst) > paused_at);
    }

    #[test]
    fn test_run_same_target_only_resumes() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        worker.run(0).unwrap();
        worker.pause();

        worker.run(0).unwrap();

        assert_eq!(worker.state(), WorkerState::Running);
        assert_eq!(worker.metrics().target_switches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_switch_to_other_target() {
        let camera = SyntheticCamera::new(4, 4).with_devices(&[0, 1]);
        let worker = CaptureWorker::new(camera).unwrap();

        worker.run(0).unwrap();
        worker.run(1).unwrap();

        assert_eq!(worker.target(), Some(1));
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_failed_switch_forgets_previous_target() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        worker.run(0).unwrap();

        assert!(worker.run(9).is_err());

        assert_eq!(worker.target(), None);
        assert_eq!(worker.state(), WorkerState::Paused);
        assert!(!worker.resume());

        worker.run(0).unwrap();
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_shutdown_stops_capture() {
        let mut worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        let count = counting(&worker);
        worker.run(0).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) > 0);

        worker.shutdown();
        let stopped_at = count.load(Ordering::SeqCst);

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(matches!(worker.run(0), Err(WorkerError::Stopped)));
        assert!(!worker.resume());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);

        worker.shutdown();
    }

    #[test]
    fn test_drop_while_paused_returns() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        drop(worker);
    }

    #[test]
    fn test_transient_errors_are_reported_and_capture_continues() {
        let camera = SyntheticCamera::new(4, 4).fail_every(3);
        let options = WorkerOptions {
            error_backoff: Duration::from_millis(1),
            ..WorkerOptions::default()
        };
        let worker = CaptureWorker::with_options(camera, options).unwrap();
        let count = counting(&worker);

        let errors = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&errors);
        let _ = worker.errors().connect(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        worker.run(0).unwrap();

        wait_until(|| errors.load(Ordering::SeqCst) >= 2 && count.load(Ordering::SeqCst) >= 4);
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_panicking_subscriber_does_not_kill_thread() {
        let worker = CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap();
        let _ = worker.frames().connect(|frame| {
            if frame.sequence % 2 == 0 {
                panic!("subscriber failure");
            }
        });
        let count = counting(&worker);

        worker.run(0).unwrap();

        wait_until(|| count.load(Ordering::SeqCst) >= 3);
        assert!(worker.metrics().handler_panics.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_subscriber_can_pause_worker() {
        let worker = Arc::new(CaptureWorker::new(SyntheticCamera::new(4, 4)).unwrap());
        let weak = Arc::downgrade(&worker);
        let _ = worker.frames().connect(move |_| {
            if let Some(worker) = weak.upgrade() {
                worker.pause();
            }
        });

        worker.run(0).unwrap();
        wait_until(|| worker.state() == WorkerState::Paused);
    }
}
