//! Shape checks that drop boxes unlikely to be a standing person.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracker::Rect;

/// Size and proportion bounds for a person box.
///
/// Sizes are fractions of the frame. The aspect ratio is height over width
/// measured in pixels, so it does not depend on the frame's own proportions.
/// The defaults correspond to 20x40 .. 300x480 pixels on a 640x480 frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    pub enabled: bool,
    pub min_width: f32,
    pub min_height: f32,
    pub max_width: f32,
    pub max_height: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            enabled: true,
            min_width: 0.03,
            min_height: 0.08,
            max_width: 0.47,
            max_height: 1.0,
            min_aspect: 1.2,
            max_aspect: 4.0,
        }
    }
}

impl QualityGate {
    /// A gate that lets every box through.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("quality_gate.min_width", self.min_width, self.max_width),
            ("quality_gate.min_height", self.min_height, self.max_height),
        ];
        for (field, min, max) in sizes {
            if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) {
                return Err(ConfigError::invalid(field, "bounds must be within [0, 1]"));
            }
            if min > max {
                return Err(ConfigError::invalid(field, format!("{min} exceeds the maximum {max}")));
            }
        }
        if !(self.min_aspect > 0.0 && self.min_aspect <= self.max_aspect) {
            return Err(ConfigError::invalid(
                "quality_gate.min_aspect",
                format!("need 0 < min_aspect <= max_aspect, got {} and {}", self.min_aspect, self.max_aspect),
            ));
        }
        Ok(())
    }

    /// Whether a normalized `bbox` on a `frame_width x frame_height` frame looks like a person.
    pub fn accepts(&self, bbox: &Rect, frame_width: u32, frame_height: u32) -> bool {
        if !self.enabled {
            return true;
        }
        if bbox.width < self.min_width || bbox.width > self.max_width {
            return false;
        }
        if bbox.height < self.min_height || bbox.height > self.max_height {
            return false;
        }
        let width_px = bbox.width * frame_width as f32;
        if width_px <= 0.0 {
            return false;
        }
        let aspect = bbox.height * frame_height as f32 / width_px;
        (self.min_aspect..=self.max_aspect).contains(&aspect)
    }
}
