//! Data models for the gaze viewer.
//!
//! - [`AppConfig`]: settings loaded from `gazeview.yaml`, one section per concern
//! - [`ViewModel`]: the elements the render loop draws, plus the primitive
//!   types they are built from ([`Point`], [`Color`], [`Circle`], [`Text`],
//!   [`Image`])
//!
//! # Architecture Note
//!
//! The view model is plain data. Concurrent access goes through
//! [`SharedView`](crate::state::SharedView), which wraps it in a
//! [`PriorityLock`](crate::sync::PriorityLock) so the render loop is never
//! starved by event callbacks.

pub mod config;
pub mod view;

pub use config::{
    AppConfig, CameraSettings, ConfigError, DemoSettings, LoggingSettings, MAX_CAMERA_DIMENSION,
    ViewSettings,
};
pub use view::{Circle, Color, Drawable, Image, Point, Text, ViewModel};
