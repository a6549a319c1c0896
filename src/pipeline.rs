//! Per-camera orchestration from captured frames to published metrics.
//!
//! Each camera runs on its own worker thread that owns its frame source,
//! detector and tracker. Results leave the worker two ways: pushed as
//! [`PipelineEvent`]s to bounded subscriber queues, and stored in a shared
//! [`CameraState`] that the [`CameraRegistry`] query methods read.

mod events;
mod metrics;
mod processor;
mod registry;
mod state;
mod throughput;
mod worker;

pub use events::{EventBus, Subscription};
pub use metrics::{
    AlertEvent, CameraStatus, ErrorEvent, ErrorKind, FrameMetrics, MetricsEnvelope, PipelineEvent, StatusEvent,
};
pub use processor::{FrameOutput, FrameProcessor};
pub use registry::{CameraRegistry, DetectorFactory, SourceFactory};
pub use state::{CameraState, CrowdSnapshot, CurrentStats, History};
pub use throughput::{FpsMeter, FrameSkip};
