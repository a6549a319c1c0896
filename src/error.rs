//! Error taxonomy for the crowd pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Frame capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device {0} is unavailable")]
    Unavailable(String),
    #[error("capture device {0} disconnected")]
    Disconnected(String),
    #[error("failed to decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-frame inference failures. Non-fatal on their own.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Backend(String),
    #[error("inference exceeded {limit:?} (took {elapsed:?})")]
    Timeout { limit: Duration, elapsed: Duration },
    #[error("unexpected model output shape {got:?}: {reason}")]
    OutputShape { got: Vec<usize>, reason: String },
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
}

/// Invalid configuration. Always surfaced at load or start time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("duplicate camera id `{0}`")]
    DuplicateCamera(String),
    #[error("unknown camera `{0}`")]
    UnknownCamera(String),
    #[error("model backend `{0}` is not compiled into this build")]
    BackendUnavailable(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Event delivery failures. Logged and absorbed, never propagated into the worker.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscriber {0} disconnected")]
    Disconnected(usize),
    #[error("subscriber {0} dropped a stale event")]
    Evicted(usize),
}

/// Errors surfaced by the camera registry and worker.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("camera {camera_id} went offline after {attempts} capture attempts: {source}")]
    CameraOffline {
        camera_id: String,
        attempts: u32,
        #[source]
        source: CaptureError,
    },
    #[error("detector unavailable after {failures} consecutive failures: {last}")]
    DetectorUnavailable {
        failures: u32,
        #[source]
        last: InferenceError,
    },
    #[error("failed to spawn worker for camera {camera_id}: {source}")]
    Spawn {
        camera_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker for camera {0} did not stop within {1:?}")]
    StopTimeout(String, Duration),
    #[error("camera {0} is still stopping; its previous worker has not exited")]
    StopPending(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
