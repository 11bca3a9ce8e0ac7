use super::config::ViewSettings;
use crate::capture::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window coordinates in pixels, origin at the top left
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// 8-bit colour in BGR channel order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Color {
    pub const fn bgr(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r }
    }

    pub const WHITE: Color = Color::bgr(255, 255, 255);
    pub const RED: Color = Color::bgr(0, 0, 255);

    /// Gaze point while the tracker reports a valid gaze
    pub const GAZE_VALID: Color = Color::bgr(0, 220, 220);

    /// Gaze point while tracking is lost
    pub const GAZE_INVALID: Color = Color::bgr(0, 0, 220);
}

/// Something the render loop can put on screen.
///
/// Drawing itself belongs to the presentation layer; the model only knows
/// whether an element should be drawn and how to describe it.
pub trait Drawable {
    fn is_visible(&self) -> bool;

    /// One-line description used by text renderers and logs
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub visible: bool,
    pub center: Point,
    pub radius: u32,
    pub color: Color,
}

impl Default for Circle {
    fn default() -> Self {
        Self {
            visible: true,
            center: Point::default(),
            radius: 10,
            color: Color::default(),
        }
    }
}

impl Drawable for Circle {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn describe(&self) -> String {
        format!(
            "circle at {} r={} bgr={},{},{}",
            self.center, self.radius, self.color.b, self.color.g, self.color.r
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub visible: bool,

    /// Bottom-left corner of the first character
    pub origin: Point,
    pub text: String,
    pub scale: f32,
    pub color: Color,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            visible: true,
            origin: Point::default(),
            text: String::new(),
            scale: 1.0,
            color: Color::WHITE,
        }
    }
}

impl Drawable for Text {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn describe(&self) -> String {
        format!("text at {}: {:?}", self.origin, self.text)
    }
}

/// The camera frame, scaled to `width` x `height` when drawn
#[derive(Debug, Clone)]
pub struct Image {
    pub visible: bool,
    pub top_left: Point,
    pub width: u32,
    pub height: u32,

    /// Latest frame; `None` until the first one arrives
    pub frame: Option<Frame>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            visible: true,
            top_left: Point::default(),
            width: 100,
            height: 100,
            frame: None,
        }
    }
}

impl Image {
    pub fn sequence(&self) -> Option<u64> {
        self.frame.as_ref().map(|frame| frame.sequence)
    }
}

impl Drawable for Image {
    // An image without data is skipped even when visible.
    fn is_visible(&self) -> bool {
        self.visible && self.frame.as_ref().is_some_and(|frame| !frame.is_empty())
    }

    fn describe(&self) -> String {
        match &self.frame {
            Some(frame) => format!(
                "image at {} {}x{} (frame #{} {}x{})",
                self.top_left, self.width, self.height, frame.sequence, frame.width, frame.height
            ),
            None => format!("image at {} {}x{} (empty)", self.top_left, self.width, self.height),
        }
    }
}

pub const CALIBRATION_HINT: &str =
    "Stare at the red circle until it disappears or moves to other place.";

pub const HELP_LINES: [&str; 2] = [
    "Press ESC to exit program, Press 'C' to start calibration",
    "Do not resize the window manually after created",
];

/// Everything the gaze viewer draws
///
/// Guarded by [`SharedView`](crate::state::SharedView): callbacks write it
/// through the low-priority facet, the render loop reads it through the
/// high-priority one.
#[derive(Debug, Clone)]
pub struct ViewModel {
    pub width: u32,
    pub height: u32,
    pub gaze_point: Circle,
    pub calibration_point: Circle,
    pub calibration_desc: Text,
    pub frame: Image,

    /// Help lines along the bottom edge
    pub descriptions: Vec<Text>,
}

impl ViewModel {
    pub fn new(settings: &ViewSettings) -> Self {
        let width = settings.width;
        let height = settings.height;
        let padding = settings.window_padding;

        let gaze_point = Circle {
            color: Color::GAZE_VALID,
            ..Circle::default()
        };

        let calibration_point = Circle {
            visible: false,
            radius: 50,
            color: Color::RED,
            ..Circle::default()
        };

        let calibration_desc = Text {
            visible: false,
            origin: Point::new(width as i32 / 2, height as i32 / 2),
            text: CALIBRATION_HINT.to_string(),
            ..Text::default()
        };

        let frame = Image {
            width: settings.frame_width,
            height: settings.frame_height,
            ..Image::default()
        };

        // Last line sits one padding above the bottom edge, earlier lines stack upwards.
        let count = HELP_LINES.len() as i32;
        let descriptions = HELP_LINES
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let from_bottom = count - i as i32;
                Text {
                    origin: Point::new(padding, height as i32 - padding * from_bottom),
                    text: (*line).to_string(),
                    scale: 1.5,
                    color: if i == 1 {
                        Color::GAZE_INVALID
                    } else {
                        Color::WHITE
                    },
                    ..Text::default()
                }
            })
            .collect();

        Self {
            width,
            height,
            gaze_point,
            calibration_point,
            calibration_desc,
            frame,
            descriptions,
        }
    }

    /// Visible elements in draw order: frame, gaze point, calibration point,
    /// calibration hint, help lines.
    pub fn visible_drawables(&self) -> Vec<&dyn Drawable> {
        let mut items: Vec<&dyn Drawable> = vec![
            &self.frame as &dyn Drawable,
            &self.gaze_point as &dyn Drawable,
            &self.calibration_point as &dyn Drawable,
            &self.calibration_desc as &dyn Drawable,
        ];
        items.extend(self.descriptions.iter().map(|text| text as &dyn Drawable));
        items.retain(|item| item.is_visible());
        items
    }

    /// Whether the help overlay (help lines and camera frame) is shown
    pub fn overlay_visible(&self) -> bool {
        self.frame.visible && self.descriptions.iter().all(|text| text.visible)
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.frame.visible = visible;
        for text in &mut self.descriptions {
            text.visible = visible;
        }
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new(&ViewSettings::default())
    }
}
