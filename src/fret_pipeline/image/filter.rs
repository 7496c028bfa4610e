//! Smoothing filters applied to channel images between correction steps.

use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::image::types::ChannelImage;

pub trait ChannelFilter {
    fn apply(&self, image: &mut ChannelImage, radius: f64) -> Result<()>;
}

/// Gaussian blur with `sigma = radius`, one slice at a time, through
/// `imageproc::filter::gaussian_blur_f32`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GaussianBlur;

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

impl ChannelFilter for GaussianBlur {
    fn apply(&self, image: &mut ChannelImage, radius: f64) -> Result<()> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(FretError::DegenerateInput(format!(
                "blur radius must be positive, got {}",
                radius
            )));
        }
        debug!("Gaussian blur, sigma={:.2}", radius);

        let (w, h) = (image.width as u32, image.height as u32);
        for slice in image.slices.iter_mut() {
            let gray = GrayF32::from_raw(w, h, std::mem::take(slice)).ok_or_else(|| {
                FretError::InvalidGeometry(format!("slice does not hold {}x{} pixels", w, h))
            })?;
            *slice = gaussian_blur_f32(&gray, radius as f32).into_raw();
        }
        Ok(())
    }
}
