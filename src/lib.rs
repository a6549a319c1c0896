//! Crowd density from video: person detection, multi-object tracking,
//! spatial grouping and risk classification, one worker per camera.
//!
//! ```ignore
//! use crowdtrack_rs::{AppConfig, CameraRegistry};
//!
//! let config = AppConfig::load("cameras.json")?;
//! let registry = CameraRegistry::new();
//! let events = registry.subscribe(config.event_capacity);
//! for camera in config.cameras {
//!     registry.start(camera)?;
//! }
//! while let Some(event) = events.recv_timeout(std::time::Duration::from_secs(1)) {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod config;
pub mod crowd;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod tracker;

pub use config::{AppConfig, CameraConfig, CaptureRetry, DegradedPolicy, TrackingMode};
pub use crowd::{Cluster, ClusterConfig, DensityLevel, DensityThresholds, SpatialClusterer, classify};
pub use detect::{Detection, Detector, DetectorSelector, ModelSpec, SyntheticDetector};
pub use error::{CaptureError, ConfigError, InferenceError, PipelineError, TransportError};
pub use frame::{Frame, FrameRef, FrameSource, SourceConfig};
pub use pipeline::{CameraRegistry, CameraStatus, FrameMetrics, MetricsEnvelope, PipelineEvent, Subscription};
pub use tracker::{CrowdTracker, Rect, TrackId, TrackerConfig};
