use image::DynamicImage;
use image::imageops::FilterType;
use serde::Serialize;
use shared::OrganType;
use std::sync::Arc;

use super::tensor::image_to_nchw;
use super::{InferenceError, TensorModel};

pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: &'static str,
    pub confidence: f32,
}

#[derive(Clone)]
pub struct Classifier {
    organ: OrganType,
    model: Arc<dyn TensorModel>,
}

impl Classifier {
    pub fn new(organ: OrganType, model: Arc<dyn TensorModel>) -> Self {
        Self { organ, model }
    }

    pub fn organ(&self) -> OrganType {
        self.organ
    }

    pub fn predict_bytes(&self, image: &[u8]) -> Result<Prediction, InferenceError> {
        let image = image::load_from_memory(image)?;
        self.predict(&image)
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction, InferenceError> {
        let input = image_to_nchw(image, CLASSIFIER_INPUT_SIZE, FilterType::Triangle);
        let output = self.model.forward(input.into_dyn().view())?;
        let scores: Vec<f32> = output.iter().copied().collect();

        let labels = self.organ.class_labels();
        if scores.len() != labels.len() {
            return Err(InferenceError::OutputError(format!(
                "{} returned {} scores for {} classes",
                self.model.name(),
                scores.len(),
                labels.len()
            )));
        }

        let probabilities = to_probabilities(&scores);
        let (index, confidence) = arg_max(&probabilities).ok_or_else(|| {
            InferenceError::OutputError(format!("{} returned no usable scores", self.model.name()))
        })?;

        let prediction = Prediction {
            label: labels[index],
            confidence,
        };
        log::info!(
            "{} prediction: {} ({:.3})",
            self.organ,
            prediction.label,
            prediction.confidence
        );
        Ok(prediction)
    }
}

/// Passes a distribution through untouched and applies softmax to anything
/// else (raw logits).
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let is_distribution = scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if is_distribution {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Index and value of the largest finite entry; first one wins on ties.
pub fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}
