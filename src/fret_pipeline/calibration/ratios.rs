//! Bleed-through ratio estimators (S1/S3 and S2/S4).
//!
//! Each ratio is the arithmetic mean of the per-pixel ratio over the pixels
//! where the divisor channel is positive and the other two channels are
//! non-negative. Every slice of the stack contributes.

use tracing::{info, instrument};

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::image::ChannelImage;

/// Which single-labelled control the images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSample {
    /// Donor-only sample: S1 = transfer/donor, S3 = acceptor/donor
    DonorOnly,
    /// Acceptor-only sample: S2 = transfer/acceptor, S4 = donor/acceptor
    AcceptorOnly,
}

/// Channel means over the included pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    pub donor: f64,
    pub transfer: f64,
    pub acceptor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioEstimate {
    pub sample: ControlSample,
    /// S1 (donor-only) or S2 (acceptor-only)
    pub ratio_a: f64,
    /// S3 (donor-only) or S4 (acceptor-only)
    pub ratio_b: f64,
    /// Intensity means of the included pixels. For the donor-only sample
    /// `means.donor` is the I1 input of the alpha estimator, for the
    /// acceptor-only sample `means.transfer` is I2.
    pub means: ChannelMeans,
    pub valid_pixels: usize,
}

/// Per-pixel ratio images, NaN where a pixel is excluded.
#[derive(Debug, Clone)]
pub struct RatioImages {
    pub ratio_a: ChannelImage,
    pub ratio_b: ChannelImage,
}

impl ControlSample {
    fn names(&self) -> (&'static str, &'static str) {
        match self {
            ControlSample::DonorOnly => ("S1", "S3"),
            ControlSample::AcceptorOnly => ("S2", "S4"),
        }
    }

    /// `(ratio_a, ratio_b)` for one pixel, `None` if excluded.
    #[inline]
    fn pixel_ratios(&self, donor: f32, transfer: f32, acceptor: f32) -> Option<(f64, f64)> {
        let (d, t, a) = (donor as f64, transfer as f64, acceptor as f64);
        match self {
            ControlSample::DonorOnly if donor > 0.0 && transfer >= 0.0 && acceptor >= 0.0 => {
                Some((t / d, a / d))
            }
            ControlSample::AcceptorOnly if acceptor > 0.0 && transfer >= 0.0 && donor >= 0.0 => {
                Some((t / a, d / a))
            }
            _ => None,
        }
    }
}

fn check_geometry(donor: &ChannelImage, transfer: &ChannelImage, acceptor: &ChannelImage) -> Result<()> {
    donor.ensure_same_geometry(transfer, "donor vs transfer")?;
    donor.ensure_same_geometry(acceptor, "donor vs acceptor")
}

#[instrument(skip(donor, transfer, acceptor))]
pub fn estimate_ratios(
    sample: ControlSample,
    donor: &ChannelImage,
    transfer: &ChannelImage,
    acceptor: &ChannelImage,
) -> Result<RatioEstimate> {
    check_geometry(donor, transfer, acceptor)?;

    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    let mut sum_d = 0.0f64;
    let mut sum_t = 0.0f64;
    let mut sum_acc = 0.0f64;
    let mut count = 0usize;

    for ((d_slice, t_slice), a_slice) in donor
        .slices
        .iter()
        .zip(&transfer.slices)
        .zip(&acceptor.slices)
    {
        for ((&d, &t), &a) in d_slice.iter().zip(t_slice).zip(a_slice) {
            if let Some((ra, rb)) = sample.pixel_ratios(d, t, a) {
                sum_a += ra;
                sum_b += rb;
                sum_d += d as f64;
                sum_t += t as f64;
                sum_acc += a as f64;
                count += 1;
            }
        }
    }

    if count == 0 {
        return Err(FretError::NoValidPixels);
    }

    let n = count as f64;
    let estimate = RatioEstimate {
        sample,
        ratio_a: sum_a / n,
        ratio_b: sum_b / n,
        means: ChannelMeans {
            donor: sum_d / n,
            transfer: sum_t / n,
            acceptor: sum_acc / n,
        },
        valid_pixels: count,
    };

    let (name_a, name_b) = sample.names();
    info!(
        "{} = {:.3}, {} = {:.3} ({} valid pixels)",
        name_a, estimate.ratio_a, name_b, estimate.ratio_b, count
    );
    Ok(estimate)
}

/// Donor-only control: returns S1 and S3.
pub fn estimate_s1_s3(donor: &ChannelImage, transfer: &ChannelImage, acceptor: &ChannelImage) -> Result<RatioEstimate> {
    estimate_ratios(ControlSample::DonorOnly, donor, transfer, acceptor)
}

/// Acceptor-only control: returns S2 and S4.
pub fn estimate_s2_s4(donor: &ChannelImage, transfer: &ChannelImage, acceptor: &ChannelImage) -> Result<RatioEstimate> {
    estimate_ratios(ControlSample::AcceptorOnly, donor, transfer, acceptor)
}

/// Full per-pixel ratio images for visual inspection.
pub fn ratio_images(
    sample: ControlSample,
    donor: &ChannelImage,
    transfer: &ChannelImage,
    acceptor: &ChannelImage,
) -> Result<RatioImages> {
    check_geometry(donor, transfer, acceptor)?;

    let mut ratio_a = ChannelImage::filled(donor.width, donor.height, donor.slice_count(), f32::NAN);
    let mut ratio_b = ratio_a.clone();

    for s in 0..donor.slice_count() {
        for i in 0..donor.pixel_count() {
            let px = sample.pixel_ratios(donor.slices[s][i], transfer.slices[s][i], acceptor.slices[s][i]);
            if let Some((ra, rb)) = px {
                ratio_a.slices[s][i] = ra as f32;
                ratio_b.slices[s][i] = rb as f32;
            }
        }
    }

    Ok(RatioImages { ratio_a, ratio_b })
}
