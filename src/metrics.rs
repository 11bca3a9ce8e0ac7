// Runtime metrics module
//
// Lightweight counters for the capture worker, the view and the render loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Runtime counters shared between threads
///
/// Uses atomic operations so the capture thread, event callbacks and the
/// render loop can all record without taking a lock. The counters are read
/// for the shutdown summary and for periodic logging.
#[derive(Debug)]
pub struct Metrics {
    /// Frames captured and handed to subscribers
    pub frames_captured: AtomicU64,

    /// Capture calls that returned no frame
    pub empty_frames: AtomicU64,

    /// Capture calls that failed
    pub capture_errors: AtomicU64,

    /// Frame subscribers that panicked inside the capture thread
    pub handler_panics: AtomicU64,

    /// Successful `run()` calls that opened a new target
    pub target_switches: AtomicU64,

    /// Writes to the shared view through the low-priority facet
    pub view_updates: AtomicU64,

    /// Reads of the shared view through the high-priority facet
    pub renders: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            empty_frames: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            target_switches: AtomicU64::new(0),
            view_updates: AtomicU64::new(0),
            renders: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_frame(&self) {
        self.empty_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_error(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_target_switch(&self) {
        self.target_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_update(&self) {
        self.view_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average capture rate since creation, in frames per second
    pub fn capture_fps(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.frames_captured.load(Ordering::Relaxed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Runtime Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Capture: {} frames ({:.1} fps), {} empty, {} errors, {} target switches",
            self.frames_captured.load(Ordering::Relaxed),
            self.capture_fps(),
            self.empty_frames.load(Ordering::Relaxed),
            self.capture_errors.load(Ordering::Relaxed),
            self.target_switches.load(Ordering::Relaxed)
        );
        tracing::info!(
            "View: {} updates, {} renders, {} subscriber panics",
            self.view_updates.load(Ordering::Relaxed),
            self.renders.load(Ordering::Relaxed),
            self.handler_panics.load(Ordering::Relaxed)
        );
    }

    /// Log a one-line snapshot (for long-running sessions)
    pub fn log_periodic(&self) {
        tracing::info!(
            "Metrics: {} frames, {} view updates, {} renders, uptime {:.0}s",
            self.frames_captured.load(Ordering::Relaxed),
            self.view_updates.load(Ordering::Relaxed),
            self.renders.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
