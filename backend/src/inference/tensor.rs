//! Conversions between `image` buffers and the float tensors the models take.

use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayD};

use super::InferenceError;

/// Resizes to `size`×`size` RGB and lays the pixels out as `[1, 3, H, W]`
/// scaled to [0, 1].
pub fn image_to_nchw(image: &DynamicImage, size: u32, filter: FilterType) -> Array4<f32> {
    let rgb = image.resize_exact(size, size, filter).to_rgb8();
    rgb_to_nchw(&rgb)
}

pub fn rgb_to_nchw(rgb: &RgbImage) -> Array4<f32> {
    let (width, height) = rgb.dimensions();
    Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// Turns a generator output (`[1, 3, H, W]` or channels-last `[1, H, W, 3]`)
/// back into 8-bit RGB, clipping `value * 255` to the byte range.
pub fn output_to_rgb(output: &ArrayD<f32>) -> Result<RgbImage, InferenceError> {
    let shape = output.shape();
    if shape.len() != 4 || shape[0] != 1 {
        return Err(InferenceError::OutputError(format!(
            "expected a single image output, got shape {:?}",
            shape
        )));
    }

    let (channels_first, height, width) = if shape[1] == 3 {
        (true, shape[2], shape[3])
    } else if shape[3] == 3 {
        (false, shape[1], shape[2])
    } else {
        return Err(InferenceError::OutputError(format!(
            "expected 3 channels, got shape {:?}",
            shape
        )));
    };

    let mut rgb = RgbImage::new(width as u32, height as u32);
    for (x, y, pixel) in rgb.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = if channels_first {
                output[[0, c, y, x]]
            } else {
                output[[0, y, x, c]]
            };
            pixel[c] = to_byte(value);
        }
    }
    Ok(rgb)
}

fn to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value * 255.0).clamp(0.0, 255.0) as u8
}
