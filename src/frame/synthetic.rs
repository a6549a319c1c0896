use chrono::Utc;
use image::{Rgb, RgbImage};

use crate::error::CaptureError;
use crate::frame::source::Pacer;
use crate::frame::{Frame, FrameSource};

/// Produces uniform gray frames. Pairs with the synthetic detector in demo mode.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    limit: Option<u64>,
    pacer: Pacer,
    next_seq: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(camera_id: &str, width: u32, height: u32, limit: Option<u64>, fps: Option<f32>) -> Self {
        Self {
            name: format!("synthetic:{camera_id}"),
            width,
            height,
            limit,
            pacer: Pacer::new(fps),
            next_seq: 0,
            open: false,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        log::info!("{}: opened {}x{}", self.name, self.width, self.height);
        self.open = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.open {
            return Err(CaptureError::Unavailable(self.name.clone()));
        }
        if self.limit.is_some_and(|limit| self.next_seq >= limit) {
            return Ok(None);
        }
        self.pacer.wait();

        let image = RgbImage::from_pixel(self.width, self.height, Rgb([96, 96, 96]));
        let frame = Frame::new(self.next_seq, Utc::now(), image);
        self.next_seq += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.open {
            log::info!("{}: closed after {} frames", self.name, self.next_seq);
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic_and_bounded() {
        let mut source = SyntheticSource::new("cam", 8, 4, Some(3), None);
        source.open().unwrap();
        let seqs: Vec<u64> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.seq())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        source.close();
        source.close();
    }

    #[test]
    fn test_unopened_source_errors() {
        let mut source = SyntheticSource::new("cam", 8, 4, None, None);
        assert!(matches!(source.next_frame(), Err(CaptureError::Unavailable(_))));
    }
}
