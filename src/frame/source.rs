use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, ConfigError};
use crate::frame::{Frame, ImageDirSource, SyntheticSource};

/// A time-ordered stream of frames from one capture device.
///
/// `open` acquires the device and `close` releases it; a source is owned by
/// exactly one camera worker for its whole lifetime.
pub trait FrameSource: Send {
    /// Human readable identifier used in logs.
    fn name(&self) -> &str;

    /// Acquire the device. Called once before the first `next_frame`.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Next frame in capture order, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the device. Must be idempotent.
    fn close(&mut self);
}

/// Which frame source a camera reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Blank frames at a fixed size, for demos and tests.
    Synthetic {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        /// Stop after this many frames; unbounded when absent.
        #[serde(default)]
        frames: Option<u64>,
        /// Pace output to this rate; as fast as possible when absent.
        #[serde(default)]
        fps: Option<f32>,
    },
    /// Image files of a directory, in file-name order.
    ImageDir {
        path: PathBuf,
        #[serde(default)]
        fps: Option<f32>,
        #[serde(default)]
        looped: bool,
    },
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Synthetic {
            width: default_width(),
            height: default_height(),
            frames: None,
            fps: None,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fps = match self {
            Self::Synthetic { width, height, fps, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(ConfigError::invalid("source.width", "frame size must be non-zero"));
                }
                fps
            }
            Self::ImageDir { path, fps, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("source.path", "must not be empty"));
                }
                fps
            }
        };
        match fps {
            Some(fps) if !(*fps > 0.0 && fps.is_finite()) => {
                Err(ConfigError::invalid("source.fps", "must be positive"))
            }
            _ => Ok(()),
        }
    }

    /// Build the source described by this config. Nothing is opened yet.
    pub fn build(&self, camera_id: &str) -> Box<dyn FrameSource> {
        match self {
            Self::Synthetic {
                width,
                height,
                frames,
                fps,
            } => Box::new(SyntheticSource::new(camera_id, *width, *height, *frames, *fps)),
            Self::ImageDir { path, fps, looped } => {
                Box::new(ImageDirSource::new(path.clone(), *fps, *looped))
            }
        }
    }
}

/// Sleeps just enough to hold a source at its nominal frame rate.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Option<std::time::Duration>,
    next_due: Option<std::time::Instant>,
}

impl Pacer {
    pub(crate) fn new(fps: Option<f32>) -> Self {
        Self {
            interval: fps.map(|fps| std::time::Duration::from_secs_f32(1.0 / fps)),
            next_due: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = std::time::Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let base = self.next_due.map_or(now, |due| due.max(now));
        self.next_due = Some(base + interval);
    }
}
