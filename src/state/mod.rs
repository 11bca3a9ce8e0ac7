// Shared view module
//
// SharedView wraps the ViewModel in a PriorityLock and publishes change events
// so other parts of the application can react without polling.

use crate::capture::Frame;
use crate::metrics::Metrics;
use crate::models::{Color, Point, ViewModel, ViewSettings};
use crate::signal::Signal;
use crate::sync::{HighGuard, PriorityLock};
use std::ops::Deref;
use std::sync::Arc;

/// Change events emitted when the view model is modified
///
/// Emitted after the lock is released, on the thread that made the update.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewChange {
    /// The gaze point moved
    GazeMoved { to: Point },

    /// Tracking was lost or regained
    GazeValidityChanged { valid: bool },

    /// The calibration target moved
    CalibrationPointMoved { to: Point },

    /// The calibration target or its hint text was shown or hidden
    CalibrationVisibilityChanged { point: bool, hint: bool },

    /// A new camera frame was stored
    FrameUpdated { sequence: u64 },

    /// The help lines and camera frame were shown or hidden
    OverlayVisibilityChanged { visible: bool },
}

/// The parts of the model that change detection compares
#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    gaze_center: Point,
    gaze_valid: bool,
    calibration_center: Point,
    calibration_point_visible: bool,
    calibration_hint_visible: bool,
    frame_sequence: Option<u64>,
    overlay_visible: bool,
}

impl Fingerprint {
    fn of(view: &ViewModel) -> Self {
        Self {
            gaze_center: view.gaze_point.center,
            gaze_valid: view.gaze_point.color != Color::GAZE_INVALID,
            calibration_center: view.calibration_point.center,
            calibration_point_visible: view.calibration_point.visible,
            calibration_hint_visible: view.calibration_desc.visible,
            frame_sequence: view.frame.sequence(),
            overlay_visible: view.overlay_visible(),
        }
    }

    fn diff(&self, new: &Self) -> Vec<ViewChange> {
        let mut changes = Vec::new();

        if self.gaze_center != new.gaze_center {
            changes.push(ViewChange::GazeMoved {
                to: new.gaze_center,
            });
        }

        if self.gaze_valid != new.gaze_valid {
            changes.push(ViewChange::GazeValidityChanged {
                valid: new.gaze_valid,
            });
        }

        if self.calibration_center != new.calibration_center {
            changes.push(ViewChange::CalibrationPointMoved {
                to: new.calibration_center,
            });
        }

        if self.calibration_point_visible != new.calibration_point_visible
            || self.calibration_hint_visible != new.calibration_hint_visible
        {
            changes.push(ViewChange::CalibrationVisibilityChanged {
                point: new.calibration_point_visible,
                hint: new.calibration_hint_visible,
            });
        }

        if self.frame_sequence != new.frame_sequence
            && let Some(sequence) = new.frame_sequence
        {
            changes.push(ViewChange::FrameUpdated { sequence });
        }

        if self.overlay_visible != new.overlay_visible {
            changes.push(ViewChange::OverlayVisibilityChanged {
                visible: new.overlay_visible,
            });
        }

        changes
    }
}

/// Thread-safe view model shared by event callbacks and the render loop
///
/// Two roles use it:
/// - **Writers** (gaze, calibration and frame callbacks) go through
///   [`update()`](Self::update), which takes the low-priority side of the
///   lock. Writers wait whenever the render loop is waiting.
/// - **The reader** (render loop) goes through [`read()`](Self::read),
///   [`snapshot()`](Self::snapshot) or [`render_guard()`](Self::render_guard),
///   which take the high-priority side and only hand out shared references.
///
/// # Related Types
///
/// - [`crate::models::ViewModel`]: The underlying data
/// - [`ViewChange`]: Events emitted on mutations
/// - [`crate::tracking::bind_view`]: Connects tracking signals to a view
pub struct SharedView {
    model: PriorityLock<ViewModel>,
    changes: Signal<ViewChange>,
    metrics: Arc<Metrics>,
}

impl SharedView {
    pub fn new(settings: &ViewSettings) -> Self {
        Self::with_metrics(settings, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(settings: &ViewSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            model: PriorityLock::new(ViewModel::new(settings)),
            changes: Signal::new(),
            metrics,
        }
    }

    /// Execute a function with read access to the view, ahead of any waiting
    /// writers
    ///
    /// # Example
    /// ```
    /// use gazeview::models::Point;
    /// use gazeview::state::SharedView;
    ///
    /// let view = SharedView::default();
    /// view.set_gaze(Point::new(120, 80), true);
    ///
    /// let gaze = view.read(|model| model.gaze_point.center);
    /// assert_eq!(gaze, Point::new(120, 80));
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ViewModel) -> R,
    {
        let guard = self.render_guard();
        f(&guard)
    }

    /// Like [`read()`](Self::read), but returns `None` instead of waiting.
    pub fn try_read<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&ViewModel) -> R,
    {
        let guard = self.model.try_lock_high()?;
        self.metrics.record_render();
        Some(f(&guard))
    }

    /// Clone the whole model. Frame data is shared, not copied.
    pub fn snapshot(&self) -> ViewModel {
        self.read(ViewModel::clone)
    }

    /// Hold the view for the duration of a render pass.
    ///
    /// Writers are blocked until the guard is dropped.
    pub fn render_guard(&self) -> RenderGuard<'_> {
        let guard = self.model.lock_high();
        self.metrics.record_render();
        RenderGuard { guard }
    }

    /// Update the view and emit change events
    ///
    /// # Arguments
    /// * `update_fn` - A function that mutates the model
    ///
    /// # Returns
    /// The changes that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<ViewChange>
    where
        F: FnOnce(&mut ViewModel),
    {
        let changes = {
            let mut model = self.model.lock_low();
            Self::apply(&mut model, update_fn)
        };
        self.publish(&changes);
        changes
    }

    /// Like [`update()`](Self::update), but returns `None` without running
    /// `update_fn` when the lock is busy or the render loop is waiting.
    pub fn try_update<F>(&self, update_fn: F) -> Option<Vec<ViewChange>>
    where
        F: FnOnce(&mut ViewModel),
    {
        let changes = {
            let mut model = self.model.try_lock_low()?;
            Self::apply(&mut model, update_fn)
        };
        self.publish(&changes);
        Some(changes)
    }

    /// Subscribe to change events
    pub fn changes(&self) -> &Signal<ViewChange> {
        &self.changes
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Store a gaze sample. An invalid sample keeps the last position and
    /// recolours the point.
    pub fn set_gaze(&self, at: Point, valid: bool) -> Vec<ViewChange> {
        self.update(|model| {
            if valid {
                model.gaze_point.center = at;
                model.gaze_point.color = Color::GAZE_VALID;
            } else {
                model.gaze_point.color = Color::GAZE_INVALID;
            }
            model.gaze_point.visible = true;
        })
    }

    /// Show the calibration hint and hide everything that would distract.
    pub fn begin_calibration(&self) -> Vec<ViewChange> {
        self.update(|model| {
            model.calibration_desc.visible = true;
            model.set_overlay_visible(false);
        })
    }

    /// Move the calibration target to `at` and show it in place of the hint.
    pub fn show_calibration_point(&self, at: Point) -> Vec<ViewChange> {
        self.update(|model| {
            model.calibration_point.center = at;
            model.calibration_point.visible = true;
            model.calibration_desc.visible = false;
        })
    }

    pub fn finish_calibration(&self) -> Vec<ViewChange> {
        self.update(|model| {
            model.calibration_desc.visible = false;
            model.calibration_point.visible = false;
            model.set_overlay_visible(true);
        })
    }

    pub fn set_frame(&self, frame: Frame) -> Vec<ViewChange> {
        self.update(|model| model.frame.frame = Some(frame))
    }

    fn apply<F>(model: &mut ViewModel, update_fn: F) -> Vec<ViewChange>
    where
        F: FnOnce(&mut ViewModel),
    {
        let before = Fingerprint::of(model);
        update_fn(model);
        before.diff(&Fingerprint::of(model))
    }

    fn publish(&self, changes: &[ViewChange]) {
        self.metrics.record_view_update();
        for change in changes {
            self.changes.emit(change);
        }
    }
}

impl Default for SharedView {
    fn default() -> Self {
        Self::new(&ViewSettings::default())
    }
}

impl std::fmt::Debug for SharedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedView")
            .field("model", &self.model)
            .field("changes", &self.changes)
            .finish()
    }
}

/// Read-only access to the view for one render pass
#[must_use = "the view is released as soon as the guard is dropped"]
pub struct RenderGuard<'a> {
    guard: HighGuard<'a, ViewModel>,
}

impl Deref for RenderGuard<'_> {
    type Target = ViewModel;

    fn deref(&self) -> &ViewModel {
        &self.guard
    }
}
