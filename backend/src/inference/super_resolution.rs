use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::sync::Arc;

use super::tensor::{image_to_nchw, output_to_rgb};
use super::{InferenceError, TensorModel};

/// The generator always sees a 64×64 input, whatever the upload size.
pub const SR_INPUT_SIZE: u32 = 64;

#[derive(Clone)]
pub struct SuperResolver {
    generator: Arc<dyn TensorModel>,
}

impl SuperResolver {
    pub fn new(generator: Arc<dyn TensorModel>) -> Self {
        Self { generator }
    }

    pub fn upscale(&self, image: &DynamicImage) -> Result<RgbImage, InferenceError> {
        let input = image_to_nchw(image, SR_INPUT_SIZE, FilterType::CatmullRom);
        let output = self.generator.forward(input.into_dyn().view())?;
        let upscaled = output_to_rgb(&output)?;
        log::info!(
            "Super-resolved {}x{} -> {}x{}",
            image.width(),
            image.height(),
            upscaled.width(),
            upscaled.height()
        );
        Ok(upscaled)
    }
}
