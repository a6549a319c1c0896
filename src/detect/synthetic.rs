//! Demo-mode detector that invents people instead of running a model.
//!
//! Only selected explicitly through configuration. It is never substituted
//! for a failing model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::detect::{Detection, Detector};
use crate::error::{ConfigError, InferenceError};
use crate::frame::Frame;
use crate::tracker::Rect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub min_people: usize,
    pub max_people: usize,
    /// Largest per-frame step of a walker, in normalized units.
    pub max_step: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_people: 0,
            max_people: 15,
            max_step: 0.01,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_people > self.max_people {
            return Err(ConfigError::invalid(
                "detector.min_people",
                format!("{} exceeds max_people {}", self.min_people, self.max_people),
            ));
        }
        if !(self.max_step >= 0.0 && self.max_step.is_finite()) {
            return Err(ConfigError::invalid("detector.max_step", "must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Walker {
    cx: f32,
    cy: f32,
    width: f32,
    height: f32,
}

enum Mode {
    Random { rng: StdRng, walkers: Vec<Walker> },
    Scripted { frames: Vec<Vec<Detection>>, cursor: usize },
}

pub struct SyntheticDetector {
    config: SyntheticConfig,
    mode: Mode,
}

impl SyntheticDetector {
    /// People that wander around the frame, reproducible for a given seed.
    pub fn random(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let initial = rng.gen_range(config.min_people..=config.max_people);
        let walkers = (0..initial).map(|_| Self::spawn_walker(&mut rng)).collect();
        Self {
            config,
            mode: Mode::Random { rng, walkers },
        }
    }

    /// Replay fixed detections, one list per call; empty once exhausted.
    pub fn scripted(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            config: SyntheticConfig::default(),
            mode: Mode::Scripted { frames, cursor: 0 },
        }
    }

    fn spawn_walker(rng: &mut StdRng) -> Walker {
        let height = rng.gen_range(0.12..0.20);
        Walker {
            cx: rng.gen_range(0.1..0.9),
            cy: rng.gen_range(0.15..0.85),
            width: height * rng.gen_range(0.35..0.5),
            height,
        }
    }

    fn step_random(rng: &mut StdRng, walkers: &mut Vec<Walker>, config: &SyntheticConfig) -> Vec<Detection> {
        // Population drifts by at most one person per frame.
        match rng.gen_range(0..10) {
            0 if walkers.len() < config.max_people => walkers.push(Self::spawn_walker(rng)),
            1 if walkers.len() > config.min_people => {
                let index = rng.gen_range(0..walkers.len());
                walkers.remove(index);
            }
            _ => {}
        }

        walkers
            .iter_mut()
            .map(|w| {
                if config.max_step > 0.0 {
                    w.cx = (w.cx + rng.gen_range(-config.max_step..=config.max_step)).clamp(0.05, 0.95);
                    w.cy = (w.cy + rng.gen_range(-config.max_step..=config.max_step)).clamp(0.1, 0.9);
                }
                let bbox = Rect::from_cxcywh(w.cx, w.cy, w.width, w.height).clamp_unit();
                Detection::person(bbox, rng.gen_range(0.6..1.0))
            })
            .collect()
    }
}

impl Detector for SyntheticDetector {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let detections = match &mut self.mode {
            Mode::Random { rng, walkers } => Self::step_random(rng, walkers, &self.config),
            Mode::Scripted { frames, cursor } => {
                let detections = frames.get(*cursor).cloned().unwrap_or_default();
                *cursor += 1;
                detections
            }
        };
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::RgbImage;

    fn frame() -> Frame {
        Frame::new(0, Utc::now(), RgbImage::new(2, 2))
    }

    #[test]
    fn test_same_seed_same_people() {
        let mut a = SyntheticDetector::random(SyntheticConfig::default());
        let mut b = SyntheticDetector::random(SyntheticConfig::default());
        for _ in 0..20 {
            assert_eq!(a.detect(&frame()).unwrap(), b.detect(&frame()).unwrap());
        }
    }

    #[test]
    fn test_population_stays_in_bounds() {
        let config = SyntheticConfig {
            min_people: 3,
            max_people: 6,
            ..SyntheticConfig::default()
        };
        let mut detector = SyntheticDetector::random(config);
        for _ in 0..200 {
            let dets = detector.detect(&frame()).unwrap();
            assert!((3..=6).contains(&dets.len()));
            assert!(dets.iter().all(|d| (0.0..=1.0).contains(&d.confidence)));
        }
    }

    #[test]
    fn test_scripted_replays_then_goes_empty() {
        let one = vec![Detection::person(Rect::new(0.1, 0.1, 0.1, 0.1), 0.9)];
        let mut detector = SyntheticDetector::scripted(vec![one.clone(), vec![]]);
        assert_eq!(detector.detect(&frame()).unwrap(), one);
        assert!(detector.detect(&frame()).unwrap().is_empty());
        assert!(detector.detect(&frame()).unwrap().is_empty());
    }
}
