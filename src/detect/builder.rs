//! Builder for detections decoded from raw model rows.

use crate::detect::detection::{Detection, PERSON_CLASS};
use crate::tracker::Rect;

/// Assembles a [`Detection`] from whichever box layout a model emits.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    class_id: u32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self {
            class_id: PERSON_CLASS,
            ..Self::default()
        }
    }

    /// Box as corners (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Box as center plus size (cx, cy, w, h), the YOLO head layout.
    pub fn cxcywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Build the detection; the confidence is clamped into `[0, 1]`.
    pub fn build(self) -> Detection {
        Detection::new(
            Rect::from_tlbr(self.x1, self.y1, self.x2, self.y2),
            self.confidence.clamp(0.0, 1.0),
            self.class_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cxcywh_matches_tlbr() {
        let a = DetectionBuilder::new().cxcywh(30.0, 50.0, 40.0, 60.0).confidence(0.95).build();
        let b = DetectionBuilder::new().tlbr(10.0, 20.0, 50.0, 80.0).confidence(0.95).build();
        assert_eq!(a, b);
        assert!(a.is_person());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let det = DetectionBuilder::new().confidence(1.7).class_id(2).build();
        assert_eq!(det.confidence, 1.0);
        assert_eq!(det.class_id, 2);
    }
}
