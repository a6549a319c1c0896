#![cfg(feature = "backend-tract")]

use std::path::Path;

use ndarray::{Array4, ArrayD, IxDyn};
use tract_onnx::prelude::*;

use crate::detect::model::{InferenceBackend, ModelSpec};
use crate::error::InferenceError;

/// ONNX inference through tract.
///
/// Loads a local model file once; no network I/O.
pub struct TractBackend {
    plan: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
}

impl TractBackend {
    /// Load an ONNX model and fix its input to the shape in `spec`.
    pub fn load(model_path: &Path, spec: &ModelSpec) -> Result<Self, InferenceError> {
        let input_shape = [1, 3, spec.input_height as usize, spec.input_width as usize];
        let load_err = |stage: &str, err: TractError| {
            InferenceError::ModelLoad(format!("{}: {stage}: {err}", model_path.display()))
        };
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err("read", e))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(input_shape[0], input_shape[1], input_shape[2], input_shape[3])))
            .map_err(|e| load_err("input fact", e))?
            .into_optimized()
            .map_err(|e| load_err("optimize", e))?
            .into_runnable()
            .map_err(|e| load_err("plan", e))?;
        log::info!("tract model {} ready, input {:?}", model_path.display(), input_shape);
        Ok(Self { plan, input_shape })
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
        if input.shape() != self.input_shape {
            return Err(InferenceError::Preprocess(format!(
                "input {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(&self.input_shape, &data)
            .map_err(|e| InferenceError::Preprocess(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Backend("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Backend(format!("output tensor was not f32: {e}")))?;
        let shape = view.shape().to_vec();
        ArrayD::from_shape_vec(IxDyn(&shape), view.iter().copied().collect()).map_err(|e| {
            InferenceError::OutputShape {
                got: shape,
                reason: e.to_string(),
            }
        })
    }
}
