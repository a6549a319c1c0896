//! The detector capability and the failure guard wrapped around it.

use std::time::{Duration, Instant};

use crate::detect::Detection;
use crate::error::{InferenceError, PipelineError};
use crate::frame::Frame;

/// Person detector over a single frame.
///
/// Implementations return person boxes normalized to the frame, already
/// filtered by confidence and de-duplicated. They keep no per-frame state
/// beyond lazily loaded weights.
///
/// # Example
///
/// ```ignore
/// use crowdtrack_rs::{Detection, Detector, Frame, InferenceError};
///
/// struct MyDetector;
///
/// impl Detector for MyDetector {
///     fn name(&self) -> &'static str {
///         "mine"
///     }
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError>;
}

/// Result of one guarded detection call.
#[derive(Debug, Clone, Default)]
pub struct GuardedDetections {
    pub detections: Vec<Detection>,
    /// The detector failed on this frame and `detections` is empty.
    pub failed: bool,
    /// Why the frame failed, for error events.
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Turns single-frame failures into empty results and escalates streaks.
pub struct DetectorGuard {
    inner: Box<dyn Detector>,
    timeout: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    total_failures: u64,
}

impl DetectorGuard {
    pub fn new(inner: Box<dyn Detector>, timeout: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            inner,
            timeout,
            max_consecutive_failures,
            consecutive_failures: 0,
            total_failures: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run the detector on `frame`.
    ///
    /// A failed or overlong call yields an empty, `failed` result. Once
    /// `max_consecutive_failures` calls fail in a row the detector is
    /// reported as unavailable.
    pub fn detect(&mut self, frame: &Frame) -> Result<GuardedDetections, PipelineError> {
        let started = Instant::now();
        let result = self.inner.detect(frame);
        let elapsed = started.elapsed();

        let result = match result {
            Ok(_) if elapsed > self.timeout => Err(InferenceError::Timeout {
                limit: self.timeout,
                elapsed,
            }),
            other => other,
        };

        match result {
            Ok(mut detections) => {
                if self.consecutive_failures > 0 {
                    log::info!(
                        "detector {} recovered after {} failed frames",
                        self.inner.name(),
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                detections.retain(|d| d.is_person() && (0.0..=1.0).contains(&d.confidence));
                Ok(GuardedDetections {
                    detections,
                    failed: false,
                    error: None,
                    elapsed,
                })
            }
            Err(err) => {
                self.consecutive_failures += 1;
                self.total_failures += 1;
                log::warn!(
                    "detector {} failed on frame {} ({}/{}): {}",
                    self.inner.name(),
                    frame.seq(),
                    self.consecutive_failures,
                    self.max_consecutive_failures,
                    err
                );
                if self.consecutive_failures >= self.max_consecutive_failures {
                    return Err(PipelineError::DetectorUnavailable {
                        failures: self.consecutive_failures,
                        last: err,
                    });
                }
                Ok(GuardedDetections {
                    detections: Vec::new(),
                    failed: true,
                    error: Some(err.to_string()),
                    elapsed,
                })
            }
        }
    }
}
