//! Model-backed detector and the compatibility layer for exported YOLO heads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{Array4, ArrayD, ArrayView2, Axis, Ix2};
use serde::{Deserialize, Serialize};

use crate::detect::builder::DetectionBuilder;
use crate::detect::detection::{Detection, PERSON_CLASS};
use crate::detect::letterbox::letterbox;
use crate::detect::nms::{filter_confidence, non_max_suppression};
use crate::detect::quality::QualityGate;
use crate::detect::Detector;
use crate::error::{ConfigError, InferenceError};
use crate::frame::Frame;

/// Row layout of the detection head output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `[1, 4 + nc, N]`: channel-first cx, cy, w, h then class scores (YOLOv8/11 export)
    #[default]
    Yolov8,
    /// `[1, N, 4 + nc]`: the same rows, anchor-first
    Yolov8Transposed,
    /// `[1, N, 5 + nc]`: cx, cy, w, h, objectness, class scores (YOLOv5 export)
    Yolov5,
}

/// What the exported model expects and emits.
///
/// Written next to the weights as `<model>.json` by the export step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub input_width: u32,
    pub input_height: u32,
    pub layout: OutputLayout,
    pub num_classes: usize,
    pub person_class: u32,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            layout: OutputLayout::Yolov8,
            num_classes: 80,
            person_class: PERSON_CLASS,
        }
    }
}

impl ModelSpec {
    /// Path of the metadata file that accompanies `model_path`.
    pub fn sidecar_path(model_path: &Path) -> PathBuf {
        model_path.with_extension("json")
    }

    /// Read the sidecar metadata if the export step left one.
    pub fn load_sidecar(model_path: &Path) -> Result<Option<Self>, ConfigError> {
        let path = Self::sidecar_path(model_path);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let spec: Self = serde_json::from_str(&text)?;
        spec.validate()?;
        Ok(Some(spec))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ConfigError::invalid("model.input_width", "input shape must be non-zero"));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::invalid("model.num_classes", "must be at least 1"));
        }
        if self.person_class as usize >= self.num_classes {
            return Err(ConfigError::invalid(
                "model.person_class",
                format!("{} is outside {} classes", self.person_class, self.num_classes),
            ));
        }
        Ok(())
    }

    fn row_len(&self) -> usize {
        match self.layout {
            OutputLayout::Yolov8 | OutputLayout::Yolov8Transposed => 4 + self.num_classes,
            OutputLayout::Yolov5 => 5 + self.num_classes,
        }
    }
}

/// Decode a raw head output into detections in model input pixels.
///
/// Every anchor yields its best class; nothing is filtered here.
pub fn decode_output(output: &ArrayD<f32>, spec: &ModelSpec) -> Result<Vec<Detection>, InferenceError> {
    let shape = output.shape().to_vec();
    let shape_error = |reason: String| InferenceError::OutputShape {
        got: shape.clone(),
        reason,
    };

    let view = match output.ndim() {
        3 if shape[0] == 1 => output.index_axis(Axis(0), 0),
        2 => output.view(),
        _ => return Err(shape_error("expected [1, C, N] or [C, N]".into())),
    };
    let matrix = view
        .into_dimensionality::<Ix2>()
        .map_err(|err| shape_error(err.to_string()))?;

    // Normalize to one anchor per row.
    let rows: ArrayView2<f32> = match spec.layout {
        OutputLayout::Yolov8 => matrix.reversed_axes(),
        OutputLayout::Yolov8Transposed | OutputLayout::Yolov5 => matrix,
    };
    if rows.ncols() != spec.row_len() {
        return Err(shape_error(format!(
            "rows carry {} values, {:?} with {} classes needs {}",
            rows.ncols(),
            spec.layout,
            spec.num_classes,
            spec.row_len()
        )));
    }

    let class_offset = spec.row_len() - spec.num_classes;
    let detections = rows
        .outer_iter()
        .filter_map(|row| {
            let (class_id, class_score) = row
                .iter()
                .skip(class_offset)
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            let confidence = match spec.layout {
                OutputLayout::Yolov5 => row[4] * class_score,
                _ => class_score,
            };
            Some(
                DetectionBuilder::new()
                    .cxcywh(row[0], row[1], row[2], row[3])
                    .confidence(confidence)
                    .class_id(class_id as u32)
                    .build(),
            )
        })
        .collect();
    Ok(detections)
}

/// Runs a prepared NCHW tensor through a model.
///
/// `run` takes `&self` so one loaded model serves several cameras at once.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError>;
}

type Loader = Box<dyn Fn(&Path, &ModelSpec) -> Result<Box<dyn InferenceBackend>, InferenceError> + Send + Sync>;

/// Model weights loaded on first use and shared by every camera using them.
///
/// The lock covers loading only. Inference runs outside it.
pub struct LazyModel {
    path: PathBuf,
    spec: ModelSpec,
    loader: Loader,
    backend: Mutex<Option<Arc<dyn InferenceBackend>>>,
}

impl LazyModel {
    pub fn new(path: PathBuf, spec: ModelSpec, loader: Loader) -> Self {
        Self {
            path,
            spec,
            loader,
            backend: Mutex::new(None),
        }
    }

    /// Wrap a backend that is already loaded.
    pub fn preloaded(spec: ModelSpec, backend: Box<dyn InferenceBackend>) -> Self {
        let name = backend.name();
        Self {
            path: PathBuf::from(format!("<{name}>")),
            spec,
            loader: Box::new(move |_, _| {
                Err(InferenceError::ModelLoad(format!("preloaded backend {name} cannot be reloaded")))
            }),
            backend: Mutex::new(Some(Arc::from(backend))),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn is_loaded(&self) -> bool {
        self.backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn backend(&self) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        let mut slot = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = slot.as_ref() {
            return Ok(Arc::clone(backend));
        }
        log::info!("loading model {}", self.path.display());
        let backend: Arc<dyn InferenceBackend> = Arc::from((self.loader)(&self.path, &self.spec)?);
        *slot = Some(Arc::clone(&backend));
        Ok(backend)
    }

    pub fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
        self.backend()?.run(input)
    }
}

/// Registry-owned cache so each weight file is loaded once per process.
#[derive(Default)]
pub struct ModelCache {
    models: Mutex<HashMap<PathBuf, Arc<LazyModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(&self, path: &Path, make: impl FnOnce() -> LazyModel) -> Arc<LazyModel> {
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        models
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.models.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thresholds applied to raw model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub quality: QualityGate,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            quality: QualityGate::default(),
        }
    }
}

/// Detector running a real model: letterbox, infer, decode, filter, gate, NMS.
pub struct ModelDetector {
    model: Arc<LazyModel>,
    params: DetectionParams,
}

impl ModelDetector {
    pub fn new(model: Arc<LazyModel>, params: DetectionParams) -> Self {
        Self { model, params }
    }

    pub fn params(&self) -> DetectionParams {
        self.params
    }
}

impl Detector for ModelDetector {
    fn name(&self) -> &'static str {
        "model"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let spec = self.model.spec();
        let (input, geometry) = letterbox(frame.image(), spec.input_width, spec.input_height)?;
        let output = self.model.run(input)?;

        let quality = self.params.quality;
        let mut detections: Vec<Detection> = decode_output(&output, spec)?
            .into_iter()
            .filter(|d| d.class_id == spec.person_class)
            .map(|d| Detection::person(geometry.to_source(&d.bbox), d.confidence))
            .filter(|d| d.bbox.area() > 0.0 && quality.accepts(&d.bbox, frame.width(), frame.height()))
            .collect();
        filter_confidence(&mut detections, self.params.confidence_threshold);
        non_max_suppression(&mut detections, self.params.iou_threshold);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectorGuard;
    use chrono::Utc;
    use std::time::Duration;
    use image::RgbImage;
    use ndarray::{Array3, IxDyn};

    /// Two classes, three anchors: a strong person, its duplicate, a strong non-person.
    fn yolov8_output() -> ArrayD<f32> {
        let anchors = [
            [320.0, 320.0, 64.0, 128.0, 0.9, 0.1],
            [322.0, 320.0, 64.0, 128.0, 0.8, 0.1],
            [100.0, 100.0, 32.0, 32.0, 0.1, 0.95],
        ];
        let mut out = Array3::<f32>::zeros((1, 6, 3));
        for (n, row) in anchors.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out[[0, c, n]] = *value;
            }
        }
        out.into_dyn()
    }

    fn spec() -> ModelSpec {
        ModelSpec {
            num_classes: 2,
            ..ModelSpec::default()
        }
    }

    struct Fixed(ArrayD<f32>);

    impl InferenceBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
            assert_eq!(input.shape(), &[1, 3, 640, 640]);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_decode_yolov8_layout() {
        let dets = decode_output(&yolov8_output(), &spec()).unwrap();
        assert_eq!(dets.len(), 3);
        assert_eq!(dets[0].class_id, 0);
        assert!((dets[0].bbox.x - 288.0).abs() < 1e-4);
        assert_eq!(dets[2].class_id, 1);
    }

    #[test]
    fn test_decode_yolov5_multiplies_objectness() {
        let out = ArrayD::from_shape_vec(IxDyn(&[1, 1, 7]), vec![10.0, 10.0, 4.0, 4.0, 0.5, 0.8, 0.1]).unwrap();
        let spec = ModelSpec {
            layout: OutputLayout::Yolov5,
            num_classes: 2,
            ..ModelSpec::default()
        };
        let dets = decode_output(&out, &spec).unwrap();
        assert!((dets[0].confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_wrong_row_length() {
        let err = decode_output(&yolov8_output(), &ModelSpec::default()).unwrap_err();
        assert!(matches!(err, InferenceError::OutputShape { .. }));
    }

    #[test]
    fn test_model_detector_end_to_end() {
        let model = Arc::new(LazyModel::preloaded(spec(), Box::new(Fixed(yolov8_output()))));
        let mut detector = ModelDetector::new(model, DetectionParams::default());
        // Square frame so the letterbox is a plain 1:1 scale.
        let frame = Frame::new(0, Utc::now(), RgbImage::new(640, 640));
        let dets = detector.detect(&frame).unwrap();

        assert_eq!(dets.len(), 1, "duplicate suppressed, non-person dropped");
        let det = dets[0];
        assert!((det.confidence - 0.9).abs() < 1e-6);
        assert!((det.bbox.x - 0.45).abs() < 1e-4);
        assert!((det.bbox.height - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_model_detector_drops_squat_boxes() {
        // A confident person box twice as wide as it is tall.
        let mut out = Array3::<f32>::zeros((1, 6, 1));
        for (c, value) in [320.0, 320.0, 128.0, 64.0, 0.9, 0.0].iter().enumerate() {
            out[[0, c, 0]] = *value;
        }
        let model = Arc::new(LazyModel::preloaded(spec(), Box::new(Fixed(out.into_dyn()))));
        let frame = Frame::new(0, Utc::now(), RgbImage::new(640, 640));

        let mut gated = ModelDetector::new(Arc::clone(&model), DetectionParams::default());
        assert!(gated.detect(&frame).unwrap().is_empty());

        let params = DetectionParams {
            quality: QualityGate::disabled(),
            ..DetectionParams::default()
        };
        let mut open = ModelDetector::new(model, params);
        assert_eq!(open.detect(&frame).unwrap().len(), 1);
    }

    #[test]
    fn test_lazy_model_loads_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let model = LazyModel::new(
            PathBuf::from("person.onnx"),
            spec(),
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Fixed(yolov8_output())) as Box<dyn InferenceBackend>)
            }),
        );
        assert!(!model.is_loaded());
        for _ in 0..3 {
            model.run(Array4::zeros((1, 3, 640, 640))).unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let cache = ModelCache::new();
        let a = cache.get_or_insert_with(Path::new("a.onnx"), || LazyModel::preloaded(spec(), Box::new(Fixed(yolov8_output()))));
        let b = cache.get_or_insert_with(Path::new("a.onnx"), || unreachable!());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    /// Takes a fixed time per call and returns no anchors.
    struct Slow(Duration);

    impl InferenceBackend for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn run(&self, _input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
            std::thread::sleep(self.0);
            Ok(Array3::<f32>::zeros((1, 6, 0)).into_dyn())
        }
    }

    #[test]
    fn test_shared_model_does_not_serialize_cameras() {
        let small = ModelSpec {
            input_width: 64,
            input_height: 64,
            ..spec()
        };
        let model = Arc::new(LazyModel::preloaded(small, Box::new(Slow(Duration::from_millis(60)))));

        let failures: u64 = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..3)
                .map(|_| {
                    let model = Arc::clone(&model);
                    scope.spawn(move || {
                        let detector = ModelDetector::new(model, DetectionParams::default());
                        let mut guard = DetectorGuard::new(Box::new(detector), Duration::from_millis(150), 10);
                        let frame = Frame::new(0, Utc::now(), RgbImage::new(64, 64));
                        for _ in 0..5 {
                            let result = guard.detect(&frame).unwrap();
                            assert!(!result.failed, "{:?}", result.error);
                        }
                        guard.total_failures()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });
        assert_eq!(failures, 0);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("crowd.onnx");
        assert!(ModelSpec::load_sidecar(&model_path).unwrap().is_none());

        std::fs::write(
            ModelSpec::sidecar_path(&model_path),
            r#"{"input_width": 320, "input_height": 320, "layout": "yolov8_transposed", "num_classes": 1}"#,
        )
        .unwrap();
        let spec = ModelSpec::load_sidecar(&model_path).unwrap().unwrap();
        assert_eq!(spec.input_width, 320);
        assert_eq!(spec.layout, OutputLayout::Yolov8Transposed);
        assert_eq!(spec.person_class, 0);
    }
}
