//! Image loading and greyscale conversion for the pixel-comparison cascade.

use crate::BenchError;
use image::{DynamicImage, GenericImageView, RgbImage};
use log::debug;
use std::path::Path;

/// Decodes the image at `path`, rejecting images without pixels.
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, BenchError> {
    let image = image::open(path.as_ref())?;
    ensure_non_empty(&image)?;
    debug!(
        "Loaded {} ({}x{}, {:?})",
        path.as_ref().display(),
        image.width(),
        image.height(),
        image.color()
    );
    Ok(image)
}

pub fn ensure_non_empty(image: &DynamicImage) -> Result<(), BenchError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(BenchError::EmptyImage { width, height });
    }
    Ok(())
}

/// Row-major single channel intensities, `trunc(0.299 R + 0.587 G + 0.114 B)` per pixel.
pub fn rgb_to_grayscale(image: &DynamicImage) -> Vec<u8> {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.as_raw().clone(),
        DynamicImage::ImageRgb8(rgb) => luma_from_rgb(rgb),
        other => luma_from_rgb(&other.to_rgb8()),
    }
}

fn luma_from_rgb(rgb: &RgbImage) -> Vec<u8> {
    rgb.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)) as u8
        })
        .collect()
}
