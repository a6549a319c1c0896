#![cfg(feature = "burn-backend")]
//! Burn inference backend.
//!
//! Burn models are compiled into the binary, so the caller supplies the
//! module and this adapter moves tensors across the `ndarray` boundary.
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use crowdtrack_rs::detect::backends::burn::{BurnBackend, BurnModel};
//!
//! struct Yolo { /* ... */ }
//!
//! impl BurnModel<NdArray> for Yolo {
//!     fn forward(&self, input: Tensor<NdArray, 4>) -> Tensor<NdArray, 3> {
//!         // [1, 4 + nc, N]
//!     }
//! }
//!
//! let backend = BurnBackend::new(Yolo::load("yolo.mpk"), Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::{Array4, ArrayD, IxDyn};

use crate::detect::model::InferenceBackend;
use crate::error::InferenceError;

/// A detection network written with Burn.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Forward pass over `[batch, channels, height, width]`, returning the raw head.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 3>;
}

pub struct BurnBackend<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnModel<B>> BurnBackend<B, M> {
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }
}

impl<B, M> InferenceBackend for BurnBackend<B, M>
where
    B: Backend,
    B::Device: Send + Sync,
    M: BurnModel<B>,
{
    fn name(&self) -> &'static str {
        "burn"
    }

    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
        let shape = input.shape().to_vec();
        let data = TensorData::new(input.iter().copied().collect::<Vec<f32>>(), shape);
        let tensor = Tensor::<B, 4>::from_data(data, &self.device);

        let output = self.model.forward(tensor);
        let dims = output.dims().to_vec();
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Backend(format!("{e:?}")))?;
        ArrayD::from_shape_vec(IxDyn(&dims), values).map_err(|e| InferenceError::OutputShape {
            got: dims,
            reason: e.to_string(),
        })
    }
}
