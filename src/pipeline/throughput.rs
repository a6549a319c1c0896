use std::time::Instant;

/// Smoothing factor of the fps moving average.
const FPS_ALPHA: f32 = 0.2;

/// Selects every `(skip + 1)`th captured frame, starting with the first.
#[derive(Debug, Clone)]
pub struct FrameSkip {
    skip: u32,
    index: u64,
}

impl FrameSkip {
    pub fn new(skip: u32) -> Self {
        Self { skip, index: 0 }
    }

    /// Whether the next captured frame should be processed.
    pub fn should_process(&mut self) -> bool {
        let process = self.index % (u64::from(self.skip) + 1) == 0;
        self.index += 1;
        process
    }
}

/// Exponential moving average of processed frames per second.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    last: Option<Instant>,
    fps: f32,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed frame at `now` and return the smoothed rate.
    pub fn tick(&mut self, now: Instant) -> f32 {
        if let Some(last) = self.last.replace(now) {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    FPS_ALPHA * instant + (1.0 - FPS_ALPHA) * self.fps
                };
            }
        }
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_skip_two_processes_every_third() {
        let mut skip = FrameSkip::new(2);
        let processed: Vec<u64> = (0..10).filter(|_| skip.should_process()).collect();
        assert_eq!(processed, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_skip_zero_processes_all() {
        let mut skip = FrameSkip::new(0);
        assert!((0..5).all(|_| skip.should_process()));
    }

    #[test]
    fn test_fps_converges_on_steady_rate() {
        let mut meter = FpsMeter::new();
        let start = Instant::now();
        assert_eq!(meter.tick(start), 0.0);
        let mut fps = 0.0;
        for i in 1..=20 {
            fps = meter.tick(start + Duration::from_millis(100 * i));
        }
        assert!((fps - 10.0).abs() < 0.1, "{fps}");
    }
}
