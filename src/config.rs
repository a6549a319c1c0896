//! Application and per-camera configuration, loaded from JSON.
//!
//! Every field has a default; anything present is validated before a camera
//! starts, and an invalid value is an error rather than a silent default.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crowd::{ClusterConfig, DensityThresholds};
use crate::detect::{DetectionParams, DetectorSelector, QualityGate};
use crate::error::ConfigError;
use crate::frame::SourceConfig;
use crate::tracker::TrackerConfig;

pub const MAX_FRAME_SKIP: u32 = 3;

/// Whether detections go through the tracker before counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Tracking,
    /// Count raw filtered detections per frame.
    Stateless,
}

/// What a metrics frame reports when inference failed on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Repeat the last good counts.
    #[default]
    HoldLast,
    /// Report zero people.
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRetry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for CaptureRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl CaptureRetry {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub detector: DetectorSelector,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    /// Person box shape bounds applied to model output.
    #[serde(default)]
    pub quality_gate: QualityGate,
    /// Frames skipped between processed frames.
    #[serde(default)]
    pub frame_skip: u32,
    #[serde(default, alias = "alertThreshold")]
    pub alert_threshold: DensityThresholds,
    #[serde(default)]
    pub tracking: TrackingMode,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub degraded_policy: DegradedPolicy,
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default)]
    pub capture_retry: CaptureRetry,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Rows and columns of the density grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
}

fn default_confidence() -> f32 {
    0.5
}

fn default_iou() -> f32 {
    0.45
}

fn default_inference_timeout_ms() -> u64 {
    2_000
}

fn default_max_failures() -> u32 {
    5
}

fn default_stop_timeout_ms() -> u64 {
    5_000
}

fn default_history_len() -> usize {
    1_000
}

fn default_grid_size() -> usize {
    10
}

impl CameraConfig {
    /// A camera with every setting at its default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: SourceConfig::default(),
            detector: DetectorSelector::default(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou(),
            quality_gate: QualityGate::default(),
            frame_skip: 0,
            alert_threshold: DensityThresholds::default(),
            tracking: TrackingMode::default(),
            tracker: TrackerConfig::default(),
            cluster: ClusterConfig::default(),
            degraded_policy: DegradedPolicy::default(),
            inference_timeout_ms: default_inference_timeout_ms(),
            max_consecutive_failures: default_max_failures(),
            capture_retry: CaptureRetry::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
            history_len: default_history_len(),
            grid_size: default_grid_size(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::invalid("id", "camera id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid("confidence_threshold", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::invalid("iou_threshold", "must be within [0, 1]"));
        }
        if self.frame_skip > MAX_FRAME_SKIP {
            return Err(ConfigError::invalid(
                "frame_skip",
                format!("{} is outside 0..={MAX_FRAME_SKIP}", self.frame_skip),
            ));
        }
        if self.inference_timeout_ms == 0 {
            return Err(ConfigError::invalid("inference_timeout_ms", "must be positive"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid("max_consecutive_failures", "must be at least 1"));
        }
        if self.capture_retry.max_attempts == 0 {
            return Err(ConfigError::invalid("capture_retry.max_attempts", "must be at least 1"));
        }
        if self.history_len == 0 {
            return Err(ConfigError::invalid("history_len", "must be at least 1"));
        }
        if self.grid_size == 0 {
            return Err(ConfigError::invalid("grid_size", "must be at least 1"));
        }
        self.quality_gate.validate()?;
        self.alert_threshold.validate()?;
        self.tracker.validate()?;
        self.cluster.validate()?;
        self.source.validate()?;
        self.detector.validate()
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            quality: self.quality_gate,
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    /// Queue depth of each event subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = text.parse()?;
        log::debug!("loaded {} camera(s) from {}", config.cameras.len(), path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be at least 1"));
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::DuplicateCamera(camera.id.clone()));
            }
            camera.validate()?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crowd::DensityLevel;

    #[test]
    fn test_minimal_camera_uses_defaults() {
        let config: AppConfig = r#"{"cameras": [{"id": "gate"}]}"#.parse().unwrap();
        let camera = &config.cameras[0];
        assert_eq!(camera.confidence_threshold, 0.5);
        assert_eq!(camera.iou_threshold, 0.45);
        assert_eq!(camera.frame_skip, 0);
        assert_eq!(camera.alert_threshold, DensityThresholds::default());
        assert_eq!(camera.tracker.min_hits, 3);
        assert_eq!(camera.history_len, 1000);
        assert_eq!(camera.inference_timeout(), Duration::from_secs(2));
        assert_eq!(camera.stop_timeout(), Duration::from_secs(5));
        assert_eq!(camera, &CameraConfig::new("gate"));
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_alert_threshold_alias() {
        let config: AppConfig =
            r#"{"cameras": [{"id": "a", "alertThreshold": {"medium": 3, "high": 6}}]}"#.parse().unwrap();
        let thresholds = config.cameras[0].alert_threshold;
        assert_eq!(thresholds, DensityThresholds { medium: 3, high: 6 });
        assert_eq!(crate::crowd::classify(6, &thresholds), DensityLevel::High);
    }

    #[test]
    fn test_rejects_invalid_values() {
        for body in [
            r#"{"id": "a", "frame_skip": 4}"#,
            r#"{"id": "a", "confidence_threshold": 1.5}"#,
            r#"{"id": "a", "alert_threshold": {"medium": 8, "high": 4}}"#,
            r#"{"id": "a", "tracker": {"min_hits": 0}}"#,
            r#"{"id": "a", "quality_gate": {"min_aspect": 5.0}}"#,
            r#"{"id": ""}"#,
        ] {
            let text = format!(r#"{{"cameras": [{body}]}}"#);
            let err = text.parse::<AppConfig>().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{body}: {err}");
        }
    }

    #[test]
    fn test_quality_gate_reaches_detection_params() {
        let config: AppConfig =
            r#"{"cameras": [{"id": "a", "quality_gate": {"enabled": false, "max_aspect": 5.0}}]}"#.parse().unwrap();
        let params = config.cameras[0].detection_params();
        assert!(!params.quality.enabled);
        assert_eq!(params.quality.max_aspect, 5.0);
        assert_eq!(params.quality.min_aspect, 1.2);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = r#"{"cameras": [{"id": "a"}, {"id": "a"}]}"#.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCamera(id) if id == "a"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.json");
        std::fs::write(
            &path,
            r#"{"cameras": [{"id": "hall", "frame_skip": 2, "source": {"kind": "synthetic", "frames": 10}}]}"#,
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.cameras[0].frame_skip, 2);

        let missing = AppConfig::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn test_retry_backoff_doubles_to_cap() {
        let retry = CaptureRetry {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 500,
        };
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(3), Duration::from_millis(400));
        assert_eq!(retry.delay(4), Duration::from_millis(500));
    }
}
