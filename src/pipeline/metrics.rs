//! Values published by a camera worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crowd::DensityLevel;
use crate::frame::FrameRef;

/// Crowd summary of one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub camera_id: String,
    pub frame_seq: u64,
    pub timestamp: DateTime<Utc>,
    pub total_people: usize,
    pub num_groups: usize,
    pub num_individuals: usize,
    pub largest_group: usize,
    pub density_level: DensityLevel,
    pub fps: f32,
    /// Inference failed on this frame; the counts follow the degraded policy.
    pub degraded: bool,
}

/// A metrics frame together with the frame it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEnvelope {
    pub frame: FrameRef,
    pub metrics: FrameMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub camera_id: String,
    pub count: usize,
    pub risk_level: DensityLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Capture,
    Inference,
    DetectorUnavailable,
    Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub camera_id: String,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of a camera as seen from outside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    #[default]
    Starting,
    Live,
    /// Running, but the last frame's inference failed.
    Degraded,
    /// Capture gave up after its retries.
    Offline,
    /// The detector became unavailable.
    Error,
    Stopped,
}

impl CameraStatus {
    /// True once the worker has ended and will publish nothing further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Offline | Self::Error | Self::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub camera_id: String,
    pub status: CameraStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    Metrics(MetricsEnvelope),
    Alert(AlertEvent),
    Error(ErrorEvent),
    Status(StatusEvent),
}

impl PipelineEvent {
    pub fn camera_id(&self) -> &str {
        match self {
            Self::Metrics(envelope) => &envelope.metrics.camera_id,
            Self::Alert(alert) => &alert.camera_id,
            Self::Error(error) => &error.camera_id,
            Self::Status(status) => &status.camera_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_json_shape() {
        let envelope = MetricsEnvelope {
            frame: FrameRef {
                seq: 3,
                width: 640,
                height: 480,
            },
            metrics: FrameMetrics {
                camera_id: "gate".into(),
                frame_seq: 3,
                timestamp: Utc::now(),
                total_people: 12,
                num_groups: 2,
                num_individuals: 1,
                largest_group: 7,
                density_level: DensityLevel::High,
                fps: 24.5,
                degraded: false,
            },
        };
        let json = serde_json::to_value(PipelineEvent::Metrics(envelope)).unwrap();
        assert_eq!(json["type"], "metrics");
        assert_eq!(json["data"]["frame"]["seq"], 3);
        assert_eq!(json["data"]["metrics"]["total_people"], 12);
        assert_eq!(json["data"]["metrics"]["density_level"], "high");
        assert!(json["data"]["metrics"]["timestamp"].is_string());
    }
}
