//! Modality translation. Despite the "cg" (CycleGAN) naming of its output
//! files this is not a learned model: each direction is a fixed classical
//! filter chain.

pub mod filters;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use shared::ImageType;
use std::str::FromStr;

pub const TRANSLATION_SIZE: u32 = 256;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("Invalid input type '{0}'. Use 'ct' or 'mri'")]
    InvalidModality(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ModalityTranslator {
    /// Fraction of a contextual region's pixels a histogram bin may hold.
    pub clip_limit: f32,
    pub tiles: u32,
    pub contrast_gain: f32,
    pub brightness_offset: f32,
}

impl Default for ModalityTranslator {
    fn default() -> Self {
        Self {
            clip_limit: 0.03,
            tiles: 8,
            contrast_gain: 0.6,
            brightness_offset: 30.0,
        }
    }
}

impl ModalityTranslator {
    /// Grayscale (BT.601 weights), then resized to the fixed working size.
    pub fn preprocess(&self, image: &DynamicImage) -> GrayImage {
        let gray = filters::to_gray_bt601(image);
        imageops::resize(&gray, TRANSLATION_SIZE, TRANSLATION_SIZE, FilterType::Triangle)
    }

    /// Translates away from the modality named by `source`.
    pub fn translate(&self, image: &GrayImage, source: &str) -> Result<GrayImage, TranslationError> {
        let source = ImageType::from_str(source)
            .map_err(|_| TranslationError::InvalidModality(source.to_string()))?;
        Ok(self.translate_from(image, source))
    }

    pub fn translate_from(&self, image: &GrayImage, source: ImageType) -> GrayImage {
        log::debug!("Translating {} -> {}", source, source.opposite());
        match source {
            ImageType::Ct => filters::equalize_adapthist(image, self.tiles, self.clip_limit),
            ImageType::Mri => {
                let adjusted =
                    filters::convert_scale_abs(image, self.contrast_gain, self.brightness_offset);
                filters::gaussian_blur_5x5(&adjusted)
            }
        }
    }
}
