use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Anatomical domain of a scan. Picks the classifier and its label set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
    EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrganType {
    #[default]
    Brain,
    Lungs,
}

impl OrganType {
    /// Class labels in the order the organ's classifier emits them.
    pub fn class_labels(&self) -> &'static [&'static str] {
        match self {
            OrganType::Brain => &["glioma", "meningioma", "notumor", "pituitary"],
            OrganType::Lungs => &["benign", "malignant", "normal"],
        }
    }
}

/// Imaging modality the uploaded scan was acquired with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
    EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageType {
    #[default]
    Mri,
    Ct,
}

impl ImageType {
    pub fn opposite(&self) -> ImageType {
        match self {
            ImageType::Mri => ImageType::Ct,
            ImageType::Ct => ImageType::Mri,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub prediction: String,
    pub confidence: f32,
    pub organ_type: OrganType,
    pub image_type: ImageType,
    pub original_image: String,
    pub sr_image: String,
    pub cg_image: String,
    pub llama_response: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub prediction: String,
    #[serde(default)]
    pub organ_type: OrganType,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub brain: bool,
    pub lungs: bool,
    pub super_resolution: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub models: ModelStatus,
    pub llm_initialized: bool,
    pub timestamp: String,
}
