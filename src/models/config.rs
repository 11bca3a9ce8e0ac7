use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration from gazeview.yaml
///
/// Every section falls back to its defaults when missing from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub view: ViewSettings,
    pub logging: LoggingSettings,
    pub demo: DemoSettings,
}

/// Capture device selection and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device index handed to the capture source
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// Pause after a failed capture before retrying
    pub error_backoff_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            error_backoff_ms: 100,
        }
    }
}

/// Window and element layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub width: u32,
    pub height: u32,

    /// Size the camera frame is drawn at
    pub frame_width: u32,
    pub frame_height: u32,

    /// Distance of the help lines from the left and bottom edges
    pub window_padding: i32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_width: 480,
            frame_height: 320,
            window_padding: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for rolling log files, relative to the config directory
    pub directory: String,
    pub prefix: String,
    pub debug: bool,

    /// Mirror log output to the terminal
    pub console: bool,

    /// Write the log file as JSON lines
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            prefix: "gazeview".to_string(),
            debug: false,
            console: true,
            json: false,
        }
    }
}

/// Parameters of the bundled demo driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub run_seconds: u64,
    pub render_interval_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            run_seconds: 10,
            render_interval_ms: 10,
        }
    }
}

/// A configuration value that cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u32 },
}

/// Largest accepted camera width or height, in pixels
pub const MAX_CAMERA_DIMENSION: u32 = 8192;

impl AppConfig {
    /// Check the values that would break the worker or the view.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("camera.width", self.camera.width),
            ("camera.height", self.camera.height),
            ("camera.fps", self.camera.fps),
            ("view.width", self.view.width),
            ("view.height", self.view.height),
            ("view.frame_width", self.view.frame_width),
            ("view.frame_height", self.view.frame_height),
        ];
        if let Some((field, _)) = non_zero.into_iter().find(|&(_, value)| value == 0) {
            return Err(ConfigError::Zero { field });
        }

        let camera_dimensions = [
            ("camera.width", self.camera.width),
            ("camera.height", self.camera.height),
        ];
        if let Some((field, _)) = camera_dimensions
            .into_iter()
            .find(|&(_, value)| value > MAX_CAMERA_DIMENSION)
        {
            return Err(ConfigError::TooLarge {
                field,
                max: MAX_CAMERA_DIMENSION,
            });
        }

        if self.logging.prefix.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "logging.prefix",
            });
        }

        Ok(())
    }
}
