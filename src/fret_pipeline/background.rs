//! Background subtraction
//!
//! The background of a channel is the mean intensity inside a user-supplied
//! ROI, measured per slice. That mean plus a fixed autofluorescence offset is
//! subtracted from every pixel and negative results are clamped to zero.

use tracing::{debug, info, instrument};

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::common::stats::{clamp_non_negative, NanMean};
use crate::fret_pipeline::image::{ChannelImage, Roi};

/// Corrected image plus the measured ROI average of every slice.
#[derive(Debug, Clone)]
pub struct BackgroundCorrection {
    pub image: ChannelImage,
    /// ROI mean per slice, without the autofluorescence offset
    pub averages: Vec<f64>,
}

/// Mean of the non-NaN pixels of `slice` inside `roi`.
pub fn roi_average(image: &ChannelImage, slice: usize, roi: &Roi) -> Result<f64> {
    let pixels = image.slice(slice)?;
    let indices = roi.pixel_indices(image.width, image.height);
    if indices.is_empty() {
        return Err(FretError::EmptyRoi);
    }
    indices
        .iter()
        .map(|&i| pixels[i])
        .collect::<NanMean>()
        .mean()
        .ok_or(FretError::EmptyRoi)
}

#[instrument(skip(image, roi), fields(width = image.width, height = image.height, slices = image.slice_count()))]
pub fn subtract_background(
    image: &ChannelImage,
    roi: Option<&Roi>,
    autofluorescence: f32,
) -> Result<BackgroundCorrection> {
    let roi = roi.ok_or_else(|| FretError::missing("background ROI"))?;
    if !autofluorescence.is_finite() || autofluorescence < 0.0 {
        return Err(FretError::DegenerateInput(format!(
            "autofluorescence must be a non-negative number, got {}",
            autofluorescence
        )));
    }

    let mut corrected = image.clone();
    let mut averages = Vec::with_capacity(image.slice_count());

    for (index, slice) in corrected.slices.iter_mut().enumerate() {
        let average = roi_average(image, index, roi)?;
        let effective = (average + autofluorescence as f64) as f32;
        for p in slice.iter_mut() {
            *p = clamp_non_negative(*p - effective);
        }
        debug!("Slice {}: background {:.1}", index + 1, average);
        averages.push(average);
    }

    info!(
        "Background subtracted (first slice average {:.1}, autofluorescence {:.1})",
        averages[0], autofluorescence
    );

    Ok(BackgroundCorrection {
        image: corrected,
        averages,
    })
}

/// Sets every ROI pixel to zero in all slices.
pub fn zero_fill_roi(image: &mut ChannelImage, roi: &Roi) {
    let indices = roi.pixel_indices(image.width, image.height);
    for slice in image.slices.iter_mut() {
        for &i in &indices {
            slice[i] = 0.0;
        }
    }
}
