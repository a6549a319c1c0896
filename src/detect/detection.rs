use serde::{Deserialize, Serialize};

use crate::tracker::Rect;

/// COCO class id for "person", the only class kept downstream.
pub const PERSON_CLASS: u32 = 0;

/// One model-reported box for one object in one frame.
///
/// Boxes are normalized to `[0, 1]` of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Rect,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: Rect, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }

    pub fn person(bbox: Rect, confidence: f32) -> Self {
        Self::new(bbox, confidence, PERSON_CLASS)
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS
    }
}
