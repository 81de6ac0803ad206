//! Subtitle payloads as they travel from decoders through the player.

use crate::image::Image;
use crate::time::DcpTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A rectangle in units of the frame size (0..1 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centre(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A bitmap subtitle placed by a normalized rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSubtitle {
    pub image: Arc<Image>,
    pub rectangle: Rect,
}

/// One line (or run) of styled text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSubtitle {
    pub text: String,
    pub font: Option<String>,
    /// Point size at the reference frame height.
    pub size: f64,
    /// Horizontal stretch applied by the renderer (1 = none).
    pub aspect_adjust: f64,
    /// Proportion of frame width from the centre.
    pub h_position: f64,
    /// Proportion of frame height from the bottom.
    pub v_position: f64,
    pub colour: [u8; 3],
    pub in_time: DcpTime,
    pub out_time: Option<DcpTime>,
}

impl TextSubtitle {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
            size: 42.0,
            aspect_adjust: 1.0,
            h_position: 0.0,
            v_position: 0.1,
            colour: [255, 255, 255],
            in_time: DcpTime::zero(),
            out_time: None,
        }
    }
}

/// Subtitles that are on screen together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSubtitles {
    pub image: Vec<ImageSubtitle>,
    pub text: Vec<TextSubtitle>,
}

impl PlayerSubtitles {
    pub fn is_empty(&self) -> bool {
        self.image.is_empty() && self.text.is_empty()
    }
}
