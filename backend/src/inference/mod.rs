pub mod classifier;
pub mod super_resolution;
pub mod tensor;
pub mod torch;

use ndarray::{ArrayD, ArrayViewD};
use shared::{ModelStatus, OrganType};
use std::sync::Arc;

use crate::config::ModelPaths;

pub use classifier::{Classifier, Prediction};
pub use super_resolution::SuperResolver;
pub use torch::TorchModel;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to decode image: {0}")]
    DecodeError(#[from] image::ImageError),
    #[error("Preprocessing failed: {0}")]
    PreprocessingError(String),
    #[error("Failed to load model {0}")]
    LoadError(String),
    #[error("Model error: {0}")]
    ModelError(#[from] tch::TchError),
    #[error("Unexpected model output: {0}")]
    OutputError(String),
    #[error("Model {0} is unavailable after a panic in another request")]
    LockPoisoned(String),
}

/// A pretrained network seen as a function from one float tensor to another.
pub trait TensorModel: Send + Sync {
    fn name(&self) -> &str;
    fn forward(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError>;
}

/// All pretrained networks the pipeline uses, loaded once at startup.
pub struct Models {
    brain: Classifier,
    lungs: Classifier,
    super_resolver: SuperResolver,
}

impl Models {
    pub fn new(brain: Classifier, lungs: Classifier, super_resolver: SuperResolver) -> Self {
        Self {
            brain,
            lungs,
            super_resolver,
        }
    }

    pub fn load(paths: &ModelPaths) -> Result<Self, InferenceError> {
        let brain = TorchModel::load("brain classifier", &paths.brain_classifier)?;
        let lungs = TorchModel::load("lungs classifier", &paths.lungs_classifier)?;
        let generator = TorchModel::load("super-resolution generator", &paths.super_resolution)?;

        Ok(Self::new(
            Classifier::new(OrganType::Brain, Arc::new(brain)),
            Classifier::new(OrganType::Lungs, Arc::new(lungs)),
            SuperResolver::new(Arc::new(generator)),
        ))
    }

    pub fn classifier(&self, organ: OrganType) -> &Classifier {
        match organ {
            OrganType::Brain => &self.brain,
            OrganType::Lungs => &self.lungs,
        }
    }

    pub fn super_resolver(&self) -> &SuperResolver {
        &self.super_resolver
    }

    /// Models are loaded eagerly, so a constructed registry is fully ready.
    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            brain: true,
            lungs: true,
            super_resolution: true,
        }
    }
}
