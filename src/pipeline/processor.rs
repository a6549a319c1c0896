//! Turns one frame's detections into metrics: track, cluster, classify.

use std::time::Instant;

use crate::config::{CameraConfig, DegradedPolicy, TrackingMode};
use crate::crowd::{
    AlertTrigger, ClusterPoint, Clustering, DensityGrid, DensityThresholds, SpatialClusterer, classify,
};
use crate::detect::GuardedDetections;
use crate::frame::Frame;
use crate::pipeline::metrics::{AlertEvent, FrameMetrics, MetricsEnvelope};
use crate::pipeline::state::CrowdSnapshot;
use crate::pipeline::throughput::FpsMeter;
use crate::tracker::{CrowdTracker, TrackSnapshot};

/// Everything produced for one processed frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub envelope: MetricsEnvelope,
    pub snapshot: CrowdSnapshot,
    /// Set when this frame moved the camera into the high band.
    pub alert: Option<AlertEvent>,
}

/// Per-camera analysis state: tracker arena, clusterer and alert edge.
pub struct FrameProcessor {
    camera_id: String,
    mode: TrackingMode,
    policy: DegradedPolicy,
    thresholds: DensityThresholds,
    grid_size: usize,
    tracker: CrowdTracker,
    clusterer: SpatialClusterer,
    alerts: AlertTrigger,
    fps: FpsMeter,
    // Last good frame, repeated under `DegradedPolicy::HoldLast`.
    last_clustering: Clustering,
    last_tracks: Vec<TrackSnapshot>,
    last_points: Vec<ClusterPoint>,
}

impl FrameProcessor {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            camera_id: config.id.clone(),
            mode: config.tracking,
            policy: config.degraded_policy,
            thresholds: config.alert_threshold,
            grid_size: config.grid_size,
            tracker: CrowdTracker::new(config.tracker.clone()),
            clusterer: SpatialClusterer::new(config.cluster.clone()),
            alerts: AlertTrigger::default(),
            fps: FpsMeter::new(),
            last_clustering: Clustering::default(),
            last_tracks: Vec::new(),
            last_points: Vec::new(),
        }
    }

    pub fn tracker(&self) -> &CrowdTracker {
        &self.tracker
    }

    /// Analyse `frame` given what the detector returned for it.
    ///
    /// A failed detection leaves the tracker untouched and reports counts
    /// according to the degraded policy.
    pub fn process(&mut self, frame: &Frame, detected: &GuardedDetections, now: Instant) -> FrameOutput {
        let fps = self.fps.tick(now);

        if detected.failed {
            if self.policy == DegradedPolicy::Zero {
                self.last_clustering = Clustering::default();
                self.last_tracks.clear();
                self.last_points.clear();
            }
        } else {
            let (points, tracks) = match self.mode {
                TrackingMode::Tracking => {
                    let tracks = self.tracker.update(&detected.detections);
                    let points = tracks
                        .iter()
                        .map(|t| ClusterPoint::new(t.track_id, t.bbox))
                        .collect::<Vec<_>>();
                    (points, tracks)
                }
                TrackingMode::Stateless => {
                    let points = detected
                        .detections
                        .iter()
                        .enumerate()
                        .map(|(i, d)| ClusterPoint::new(i as u64, d.bbox))
                        .collect::<Vec<_>>();
                    (points, Vec::new())
                }
            };
            self.last_clustering = self.clusterer.cluster(&points);
            self.last_points = points;
            self.last_tracks = tracks;
        }

        let total_people = self.last_points.len();
        let density_level = classify(total_people, &self.thresholds);
        let metrics = FrameMetrics {
            camera_id: self.camera_id.clone(),
            frame_seq: frame.seq(),
            timestamp: frame.captured_at(),
            total_people,
            num_groups: self.last_clustering.clusters.len(),
            num_individuals: self.last_clustering.individuals.len(),
            largest_group: self.last_clustering.largest_group(),
            density_level,
            fps,
            degraded: detected.failed,
        };

        let alert = self.alerts.observe(density_level).then(|| AlertEvent {
            camera_id: self.camera_id.clone(),
            count: total_people,
            risk_level: density_level,
            timestamp: frame.captured_at(),
        });

        log::trace!(
            "camera {} frame {}: {} people, {} groups, {}",
            self.camera_id,
            frame.seq(),
            total_people,
            metrics.num_groups,
            density_level
        );

        let snapshot = CrowdSnapshot {
            camera_id: self.camera_id.clone(),
            frame_seq: frame.seq(),
            timestamp: frame.captured_at(),
            clusters: self.last_clustering.clusters.clone(),
            individuals: self.last_clustering.individuals.clone(),
            tracks: self.last_tracks.clone(),
            grid: DensityGrid::from_centroids(
                self.last_points.iter().map(|p| p.bbox.center()),
                self.grid_size,
                self.grid_size,
            ),
        };

        FrameOutput {
            envelope: MetricsEnvelope {
                frame: frame.reference(),
                metrics,
            },
            snapshot,
            alert,
        }
    }

    /// Drop every track, as when the camera stops.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.alerts.reset();
        self.last_clustering = Clustering::default();
        self.last_tracks.clear();
        self.last_points.clear();
    }
}
