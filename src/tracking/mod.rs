//! Tracking events and their wiring into the shared view.
//!
//! [`TrackingEvents`] is what a gaze tracker publishes through: gaze samples
//! and the calibration lifecycle, each on its own [`Signal`]. Coordinates
//! arrive in screen space and are shifted into window space before they are
//! emitted, so subscribers never see screen coordinates.
//!
//! [`bind_view`] and [`bind_frames`] connect those signals (and a capture
//! worker's frames) to a [`SharedView`]. The view is the tracked owner of
//! every subscription: once the last `Arc<SharedView>` is dropped the
//! handlers stop firing, even if the returned guards are leaked.

use crate::capture::{CaptureSource, CaptureWorker, Frame};
use crate::models::Point;
use crate::signal::{ScopedConnection, Signal};
use crate::state::SharedView;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// One gaze estimate in window coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub point: Point,

    /// `false` while the tracker has lost the eyes; `point` is then meaningless
    pub valid: bool,
}

/// Top-left corner of the viewer window in screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowOrigin {
    pub x: i32,
    pub y: i32,
}

impl WindowOrigin {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Convert a screen position to window coordinates, rounding to the
    /// nearest pixel.
    pub fn to_window(&self, screen_x: f32, screen_y: f32) -> Point {
        Point::new(
            screen_x.round() as i32 - self.x,
            screen_y.round() as i32 - self.y,
        )
    }
}

/// Signal hub of the gaze tracker
#[derive(Debug, Default)]
pub struct TrackingEvents {
    pub gaze: Signal<GazeSample>,
    pub calibration_start: Signal<()>,
    pub calibration_next_point: Signal<Point>,

    /// Progress of the current calibration point, `0.0..=1.0`
    pub calibration_progress: Signal<f32>,

    /// Calibration data produced by a finished calibration
    pub calibration_finish: Signal<Vec<f32>>,

    origin: Mutex<WindowOrigin>,
    calibrating: AtomicBool,
}

impl TrackingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_window_origin(&self, origin: WindowOrigin) {
        debug!(?origin, "Window origin updated");
        *self.origin.lock() = origin;
    }

    pub fn window_origin(&self) -> WindowOrigin {
        *self.origin.lock()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating.load(Ordering::Acquire)
    }

    /// Publish a gaze estimate given in screen coordinates.
    pub fn publish_gaze(&self, screen_x: f32, screen_y: f32, valid: bool) {
        let point = self.window_origin().to_window(screen_x, screen_y);
        self.gaze.emit(&GazeSample { point, valid });
    }

    /// Start a calibration. Returns `false` if one is already running.
    pub fn start_calibration(&self) -> bool {
        if self
            .calibrating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Calibration already in progress");
            return false;
        }
        info!("Calibration started");
        self.calibration_start.emit(&());
        true
    }

    /// Ask the user to look at a new target, given in screen coordinates.
    ///
    /// Ignored outside a calibration.
    pub fn next_calibration_point(&self, screen_x: f32, screen_y: f32) {
        if !self.is_calibrating() {
            return;
        }
        let point = self.window_origin().to_window(screen_x, screen_y);
        debug!(%point, "Next calibration point");
        self.calibration_next_point.emit(&point);
    }

    pub fn report_calibration_progress(&self, progress: f32) {
        if !self.is_calibrating() {
            return;
        }
        self.calibration_progress.emit(&progress.clamp(0.0, 1.0));
    }

    /// End the running calibration with its result data.
    ///
    /// Returns `false` when no calibration was running.
    pub fn finish_calibration(&self, data: Vec<f32>) -> bool {
        if !self.calibrating.swap(false, Ordering::AcqRel) {
            return false;
        }
        info!(values = data.len(), "Calibration finished");
        self.calibration_finish.emit(&data);
        true
    }
}

/// Drive `view` from tracking events.
///
/// Progress is only logged; it has no element in the view.
pub fn bind_view(events: &TrackingEvents, view: &Arc<SharedView>) -> Vec<ScopedConnection> {
    vec![
        events
            .gaze
            .connect_tracked(view, |view: &SharedView, sample: &GazeSample| {
                view.set_gaze(sample.point, sample.valid);
            })
            .scoped(),
        events
            .calibration_start
            .connect_tracked(view, |view: &SharedView, _: &()| {
                view.begin_calibration();
            })
            .scoped(),
        events
            .calibration_next_point
            .connect_tracked(view, |view: &SharedView, point: &Point| {
                view.show_calibration_point(*point);
            })
            .scoped(),
        events
            .calibration_progress
            .connect_tracked(view, |_: &SharedView, progress: &f32| {
                debug!("Calibration progress {:.0}%", progress * 100.0);
            })
            .scoped(),
        events
            .calibration_finish
            .connect_tracked(view, |view: &SharedView, _: &Vec<f32>| {
                view.finish_calibration();
            })
            .scoped(),
    ]
}

/// Store every frame the worker captures in `view`.
pub fn bind_frames<S: CaptureSource>(
    worker: &CaptureWorker<S>,
    view: &Arc<SharedView>,
) -> ScopedConnection {
    worker
        .frames()
        .connect_tracked(view, |view: &SharedView, frame: &Frame| {
            view.set_frame(frame.clone());
        })
        .scoped()
}
