use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One captured RGB frame. Cheap to clone; the pixels are shared and immutable.
#[derive(Debug, Clone)]
pub struct Frame {
    seq: u64,
    captured_at: DateTime<Utc>,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(seq: u64, captured_at: DateTime<Utc>, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at,
            image: Arc::new(image),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Lightweight reference sent to transports instead of the pixels.
    pub fn reference(&self) -> FrameRef {
        FrameRef {
            seq: self.seq,
            width: self.width(),
            height: self.height(),
        }
    }
}

/// Identifies a frame without carrying its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
}
