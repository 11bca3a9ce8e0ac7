//! Frame capture: the source abstraction and the pausable capture worker.
//!
//! # Components
//!
//! - [`CaptureSource`]: what the worker needs from a camera. Open a target,
//!   report whether it is open, grab one frame.
//! - [`CaptureWorker`]: owns a dedicated capture thread for its whole lifetime.
//!   The thread sits paused until [`CaptureWorker::run`] opens and verifies a
//!   target, then captures frames back to back and emits each one on
//!   [`CaptureWorker::frames`]. Frame subscribers run on the capture thread.
//! - [`SyntheticCamera`]: deterministic in-process source used by the binary
//!   and the tests.
//!
//! # Worker states
//!
//! ```text
//!            run(target) ok
//!   Paused ─────────────────▶ Running
//!     ▲  ◀──────────────────    │
//!     │   pause() / failed run  │
//!     └──── shutdown()/drop ────┴──▶ Stopped
//! ```

pub mod synthetic;
pub mod worker;

pub use synthetic::SyntheticCamera;
pub use worker::{CaptureWorker, WorkerError, WorkerOptions, WorkerState};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// One captured unit of work.
///
/// Pixel data is packed BGR, shared so subscribers can keep a frame without
/// copying it.
#[derive(Clone)]
pub struct Frame {
    /// Monotonic per-source frame number
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, data: Arc<[u8]>) -> Self {
        Self {
            sequence,
            width,
            height,
            data,
            captured_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Errors reported by a capture source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture device {0} is not available")]
    DeviceUnavailable(String),

    #[error("Capture source is not open")]
    NotOpen,

    #[error("Frame read failed: {0}")]
    ReadFailed(String),
}

/// A camera-like producer of frames.
///
/// The worker only calls these methods from behind its own device lock, so
/// implementations do not need internal synchronization.
pub trait CaptureSource: Send + 'static {
    /// Identifies which device or stream to open (a camera index, a path, ...)
    type Target: Clone + PartialEq + fmt::Debug + Send + 'static;

    /// Open `target`, replacing whatever was open before.
    fn open(&mut self, target: &Self::Target) -> Result<(), CaptureError>;

    fn is_open(&self) -> bool;

    /// Grab one frame. `Ok(None)` means the device answered but had nothing.
    fn capture_one(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the device. Called before switching targets and on shutdown.
    fn close(&mut self) {}
}
