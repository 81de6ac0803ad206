//! How a piece's native frame rate maps onto the output frame rate.

use serde::{Deserialize, Serialize};

/// Rates closer than this are treated as equal.
const FRAME_RATE_EPSILON: f64 = 1e-4;

/// Relationship between a source frame rate and the output (DCP) frame rate.
///
/// Exactly one of four regimes applies: every other source frame is dropped
/// (`skip`), each source frame is shown `repeat` times, the material is played
/// faster or slower (`change_speed`), or nothing changes. `skip`/`repeat` can be
/// combined with a small speed change (e.g. 50fps → 24fps).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateChange {
    pub source: f64,
    pub dcp: u32,
    /// Drop every other source frame.
    pub skip: bool,
    /// Show each source frame this many times (1 = no repeat).
    pub repeat: u32,
    /// Whether the material plays at a different speed than it was shot at.
    pub change_speed: bool,
    /// Output speed relative to the source (`dcp / (source * factor)`).
    pub speed_up: f64,
}

impl FrameRateChange {
    pub fn new(source: f64, dcp: u32) -> Self {
        let dcp_f = f64::from(dcp);
        let mut skip = false;
        let mut repeat = 1;

        if (source / 2.0 - dcp_f).abs() < (source - dcp_f).abs() {
            skip = true;
        } else if (source * 2.0 - dcp_f).abs() < (source - dcp_f).abs() {
            repeat = (dcp_f / source).round().max(1.0) as u32;
        }

        let factor = if skip { 0.5 } else { f64::from(repeat) };
        let speed_up = dcp_f / (source * factor);

        Self {
            source,
            dcp,
            skip,
            repeat,
            change_speed: (speed_up - 1.0).abs() >= FRAME_RATE_EPSILON,
            speed_up,
        }
    }

    /// Output frames per source frame: 0.5 when skipping, else `repeat`.
    pub fn factor(&self) -> f64 {
        if self.skip {
            0.5
        } else {
            f64::from(self.repeat)
        }
    }

    /// True when the source maps onto the output frame-for-frame.
    pub fn is_identity(&self) -> bool {
        !self.skip && self.repeat == 1 && !self.change_speed
    }

    /// One-line summary for logs and progress displays.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if self.skip {
            parts.push("each other frame will be dropped".to_string());
        } else if self.repeat == 2 {
            parts.push("each frame will be doubled".to_string());
        } else if self.repeat > 2 {
            parts.push(format!("each frame will be repeated {} times", self.repeat));
        }
        if self.change_speed {
            parts.push(format!(
                "speed will change by {:.2}%",
                (self.speed_up - 1.0) * 100.0
            ));
        }
        if parts.is_empty() {
            format!("{:.3}fps content plays at {}fps as-is", self.source, self.dcp)
        } else {
            format!(
                "{:.3}fps content at {}fps: {}",
                self.source,
                self.dcp,
                parts.join(", ")
            )
        }
    }
}
