//! Camera rectangles in scene coordinates.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle: the camera directive, a checkpoint's saved
/// viewport, and the animated viewport all share this shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Camera used when neither the batch nor a restored checkpoint has one.
    pub const DEFAULT_CAMERA: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 800.0,
        height: 600.0,
    };

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Sum of absolute per-component differences to `other`.
    pub fn total_delta(&self, other: &Rect) -> f64 {
        (self.x - other.x).abs()
            + (self.y - other.y).abs()
            + (self.width - other.width).abs()
            + (self.height - other.height).abs()
    }

    /// Finite components and a positive size.
    pub fn is_usable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::DEFAULT_CAMERA
    }
}
