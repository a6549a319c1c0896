//! What the registry knows about each camera between frames.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crowd::{Cluster, DensityGrid};
use crate::pipeline::metrics::{CameraStatus, FrameMetrics, MetricsEnvelope};
use crate::tracker::TrackSnapshot;

/// Bounded window of the most recent metrics, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<FrameMetrics>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, metrics: FrameMetrics) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<FrameMetrics> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spatial detail of the latest processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct CrowdSnapshot {
    pub camera_id: String,
    pub frame_seq: u64,
    pub timestamp: DateTime<Utc>,
    pub clusters: Vec<Cluster>,
    pub individuals: Vec<u64>,
    pub tracks: Vec<TrackSnapshot>,
    pub grid: DensityGrid,
}

/// Latest metrics with enough context to tell whether they are still live.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentStats {
    pub camera_id: String,
    pub status: CameraStatus,
    pub metrics: Option<FrameMetrics>,
    /// Milliseconds since `metrics` was produced.
    pub age_ms: Option<i64>,
}

impl CurrentStats {
    /// Metrics exist and the camera is producing new ones.
    pub fn is_live(&self) -> bool {
        self.metrics.is_some() && matches!(self.status, CameraStatus::Live | CameraStatus::Degraded)
    }
}

/// Shared between a camera worker (writer) and registry queries (readers).
#[derive(Debug)]
pub struct CameraState {
    pub(crate) status: CameraStatus,
    pub(crate) latest: Option<MetricsEnvelope>,
    pub(crate) history: History,
    pub(crate) snapshot: Option<CrowdSnapshot>,
}

impl CameraState {
    pub fn new(history_len: usize) -> Self {
        Self {
            status: CameraStatus::Starting,
            latest: None,
            history: History::new(history_len),
            snapshot: None,
        }
    }

    pub(crate) fn record(&mut self, envelope: MetricsEnvelope, snapshot: CrowdSnapshot) {
        self.history.push(envelope.metrics.clone());
        self.latest = Some(envelope);
        self.snapshot = Some(snapshot);
    }

    pub fn stats(&self, camera_id: &str) -> CurrentStats {
        let metrics = self.latest.as_ref().map(|envelope| envelope.metrics.clone());
        let age_ms = metrics
            .as_ref()
            .map(|m| (Utc::now() - m.timestamp).num_milliseconds());
        CurrentStats {
            camera_id: camera_id.to_string(),
            status: self.status,
            metrics,
            age_ms,
        }
    }
}
