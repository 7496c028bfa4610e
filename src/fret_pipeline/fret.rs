//! Pixel-wise FRET efficiency.
//!
//! For donor (DD), transfer (DA) and acceptor (AA) intensities:
//!
//! ```text
//! raw = S1·S2·(DA·(1 - S3·S4) - DD·(S1 - S2·S3) - AA·(S2 - S1·S4))
//!       / ((S1 - S2·S3)·(DD·S2 - DA·S4)·α)
//! E   = raw / (1 + raw)
//! ```
//!
//! Zero denominators are not special-cased; the resulting Inf/NaN flows into
//! the output image.

use tracing::{debug, info, instrument};

use crate::fret_pipeline::calibration::{CalibrationFactors, ResolvedFactors};
use crate::fret_pipeline::common::error::Result;
use crate::fret_pipeline::config::{ThresholdBand, ValidPixelPolicy};
use crate::fret_pipeline::image::{ChannelImage, Roi};
use crate::fret_pipeline::measurement::Statistics;

/// FRET efficiency of one pixel. NaN if any input is NaN.
#[inline]
pub fn fret_efficiency(dd: f32, da: f32, aa: f32, f: &ResolvedFactors) -> f32 {
    if dd.is_nan() || da.is_nan() || aa.is_nan() {
        return f32::NAN;
    }
    let (dd, da, aa) = (dd as f64, da as f64, aa as f64);
    let numerator = f.s1 * f.s2 * (da * (1.0 - f.s3 * f.s4) - dd * (f.s1 - f.s2 * f.s3) - aa * (f.s2 - f.s1 * f.s4));
    let denominator = (f.s1 - f.s2 * f.s3) * (dd * f.s2 - da * f.s4) * f.alpha;
    let raw = numerator / denominator;
    (raw / (1.0 + raw)) as f32
}

/// Composed FRET image and its statistics on the first slice.
#[derive(Debug, Clone)]
pub struct FretComposition {
    pub image: ChannelImage,
    pub stats: Statistics,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FretComposer {
    auto_threshold: Option<ThresholdBand>,
    valid_pixel_policy: ValidPixelPolicy,
}

impl FretComposer {
    pub fn new(auto_threshold: Option<ThresholdBand>, valid_pixel_policy: ValidPixelPolicy) -> Self {
        Self {
            auto_threshold,
            valid_pixel_policy,
        }
    }

    pub fn auto_threshold(&self) -> Option<ThresholdBand> {
        self.auto_threshold
    }

    /// Pure per-pixel composition over every slice, threshold included.
    pub fn compose_image(
        &self,
        donor: &ChannelImage,
        transfer: &ChannelImage,
        acceptor: &ChannelImage,
        factors: &ResolvedFactors,
    ) -> Result<ChannelImage> {
        donor.ensure_same_geometry(transfer, "donor vs transfer")?;
        donor.ensure_same_geometry(acceptor, "donor vs acceptor")?;

        let slices = donor
            .slices
            .iter()
            .zip(&transfer.slices)
            .zip(&acceptor.slices)
            .map(|((dd, da), aa)| {
                dd.iter()
                    .zip(da)
                    .zip(aa)
                    .map(|((&dd, &da), &aa)| {
                        let e = fret_efficiency(dd, da, aa, factors);
                        match self.auto_threshold {
                            Some(band) if !band.contains(e) => f32::NAN,
                            _ => e,
                        }
                    })
                    .collect()
            })
            .collect();

        ChannelImage::new(donor.width, donor.height, slices)
    }

    /// Composes the FRET image and measures its first slice inside `roi`
    /// (whole image when `None`).
    ///
    /// Only the first slice is measured here, also for stacks; later slices
    /// are measured separately.
    #[instrument(skip_all, fields(width = donor.width, height = donor.height, slices = donor.slice_count()))]
    pub fn compose(
        &self,
        donor: &ChannelImage,
        transfer: &ChannelImage,
        acceptor: &ChannelImage,
        factors: &CalibrationFactors,
        roi: Option<&Roi>,
    ) -> Result<FretComposition> {
        let resolved = factors.resolve()?;
        factors.warn_anomalies();
        if let Some(band) = self.auto_threshold {
            debug!("Auto-threshold band [{}, {}]", band.min, band.max);
        }

        let image = self.compose_image(donor, transfer, acceptor, &resolved)?;
        let stats = Statistics::from_slice(
            &image.slices[0],
            image.width,
            image.height,
            roi,
            self.valid_pixel_policy,
        );

        info!(
            "FRET image composed: mean efficiency {:.3} over {} of {} pixels",
            stats.mean, stats.not_nan, stats.pixels
        );
        Ok(FretComposition { image, stats })
    }
}
