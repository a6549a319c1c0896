//! Person detection: the detector capability, model decoding and post-processing.

pub mod backends;
mod builder;
mod detection;
mod detector;
mod letterbox;
mod model;
mod nms;
mod quality;
mod synthetic;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builder::DetectionBuilder;
pub use detection::{Detection, PERSON_CLASS};
pub use detector::{Detector, DetectorGuard, GuardedDetections};
pub use letterbox::{Letterbox, letterbox};
pub use model::{
    DetectionParams, InferenceBackend, LazyModel, ModelCache, ModelDetector, ModelSpec, OutputLayout,
    decode_output,
};
pub use nms::{filter_confidence, non_max_suppression};
pub use quality::QualityGate;
pub use synthetic::{SyntheticConfig, SyntheticDetector};

use crate::error::ConfigError;

/// Which detector a camera runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorSelector {
    /// Seeded random walkers. Demo mode only, never a fallback.
    Synthetic(SyntheticConfig),
    /// ONNX weights run through tract.
    Onnx {
        path: PathBuf,
        /// Overrides the `<model>.json` sidecar when present.
        #[serde(default)]
        model: Option<ModelSpec>,
    },
}

impl Default for DetectorSelector {
    fn default() -> Self {
        Self::Synthetic(SyntheticConfig::default())
    }
}

impl DetectorSelector {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Synthetic(config) => config.validate(),
            Self::Onnx { path, model } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("detector.path", "must not be empty"));
                }
                model.as_ref().map_or(Ok(()), ModelSpec::validate)
            }
        }
    }

    /// Build the detector. Model weights are shared through `cache` and
    /// loaded on the first frame, not here.
    pub fn build(&self, params: DetectionParams, cache: &ModelCache) -> Result<Box<dyn Detector>, ConfigError> {
        match self {
            Self::Synthetic(config) => Ok(Box::new(SyntheticDetector::random(config.clone()))),
            Self::Onnx { path, model } => {
                let spec = match model {
                    Some(spec) => spec.clone(),
                    None => ModelSpec::load_sidecar(path)?.unwrap_or_default(),
                };
                let shared = onnx_model(path, spec, cache)?;
                Ok(Box::new(ModelDetector::new(shared, params)))
            }
        }
    }
}

#[cfg(feature = "backend-tract")]
fn onnx_model(path: &std::path::Path, spec: ModelSpec, cache: &ModelCache) -> Result<Arc<LazyModel>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::invalid("detector.path", format!("{} does not exist", path.display())));
    }
    Ok(cache.get_or_insert_with(path, || {
        LazyModel::new(
            path.to_path_buf(),
            spec,
            Box::new(|path, spec| {
                let backend = backends::tract::TractBackend::load(path, spec)?;
                Ok(Box::new(backend) as Box<dyn InferenceBackend>)
            }),
        )
    }))
}

#[cfg(not(feature = "backend-tract"))]
fn onnx_model(_path: &std::path::Path, _spec: ModelSpec, _cache: &ModelCache) -> Result<Arc<LazyModel>, ConfigError> {
    Err(ConfigError::BackendUnavailable("tract"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parses_tagged_json() {
        let selector: DetectorSelector = serde_json::from_str(r#"{"kind": "synthetic", "seed": 7}"#).unwrap();
        match selector {
            DetectorSelector::Synthetic(config) => assert_eq!(config.seed, 7),
            other => panic!("unexpected {other:?}"),
        }

        let selector: DetectorSelector =
            serde_json::from_str(r#"{"kind": "onnx", "path": "models/yolov8n.onnx"}"#).unwrap();
        assert!(matches!(selector, DetectorSelector::Onnx { model: None, .. }));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn test_onnx_without_backend_is_a_config_error() {
        let selector = DetectorSelector::Onnx {
            path: PathBuf::from("missing.onnx"),
            model: None,
        };
        let err = selector
            .build(DetectionParams::default(), &ModelCache::new())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::BackendUnavailable("tract")));
    }
}
