// gazeview - concurrency core of a gaze-tracking camera viewer
//
// This is the library crate: the priority lock, the signal/slot channel, the
// pausable capture worker and the shared view they coordinate around.
// The binary crate (main.rs) runs a headless demo on a synthetic camera.

pub mod capture;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod signal;
pub mod state;
pub mod sync;
pub mod tracking;

// Re-export commonly used types for convenience
pub use capture::{CaptureSource, CaptureWorker, Frame, SyntheticCamera};
pub use config::ConfigManager;
pub use models::{AppConfig, ViewModel};
pub use signal::{Connection, ScopedConnection, Signal};
pub use state::{SharedView, ViewChange};
pub use sync::PriorityLock;
pub use tracking::TrackingEvents;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
