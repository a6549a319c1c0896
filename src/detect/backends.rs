//! Inference runtimes behind [`InferenceBackend`](crate::detect::InferenceBackend).

#[cfg(feature = "burn-backend")]
pub mod burn;
#[cfg(feature = "backend-tract")]
pub mod tract;
