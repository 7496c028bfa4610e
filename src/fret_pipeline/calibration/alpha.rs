//! Alpha estimation.
//!
//! Stage A derives the donor/acceptor molar absorption coefficient ratio
//! (εd/εa) from a photobleaching measurement and the means of the corrected
//! production images. Stage B combines it with the single-label intensities,
//! labelling stoichiometries and receptor counts into alpha.

use tracing::{info, instrument};

use crate::fret_pipeline::calibration::types::{required, CalibrationFactors};
use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::common::stats::NanMean;
use crate::fret_pipeline::image::ChannelImage;

/// Mean donor intensity before and after acceptor photobleaching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotobleachingPair {
    pub before: f64,
    pub after: f64,
}

impl PhotobleachingPair {
    pub fn from_images(before: &ChannelImage, after: &ChannelImage) -> Result<Self> {
        Ok(Self {
            before: image_mean(before, "donor image before bleaching")?,
            after: image_mean(after, "donor image after bleaching")?,
        })
    }
}

/// Where the FRET efficiency used by stage A comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BleachingEfficiency {
    Photobleaching(PhotobleachingPair),
    /// Efficiency entered directly
    Manual(f64),
}

/// NaN-excluded means of the corrected production images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionMeans {
    /// avgDD
    pub donor: f64,
    /// avgDT
    pub transfer: f64,
    /// avgAA
    pub acceptor: f64,
}

impl ProductionMeans {
    pub fn from_images(donor: &ChannelImage, transfer: &ChannelImage, acceptor: &ChannelImage) -> Result<Self> {
        Ok(Self {
            donor: image_mean(donor, "donor image")?,
            transfer: image_mean(transfer, "transfer image")?,
            acceptor: image_mean(acceptor, "acceptor image")?,
        })
    }
}

fn image_mean(image: &ChannelImage, what: &str) -> Result<f64> {
    image
        .slices
        .iter()
        .flatten()
        .copied()
        .collect::<NanMean>()
        .mean()
        .ok_or_else(|| FretError::DegenerateInput(format!("{} has no non-NaN pixels", what)))
}

fn nonzero(value: f64, what: &str) -> Result<f64> {
    if value == 0.0 || !value.is_finite() {
        return Err(FretError::DegenerateInput(format!("{} is {}", what, value)));
    }
    Ok(value)
}

/// `Ebl = (after - (before - S4·avgDT) / (1 - S1·S4)) / after`
pub fn bleaching_efficiency(pair: &PhotobleachingPair, s1: f64, s4: f64, avg_dt: f64) -> Result<f64> {
    let crosstalk = nonzero(1.0 - s1 * s4, "1 - S1·S4")?;
    let after = nonzero(pair.after, "donor intensity after bleaching")?;
    Ok((after - (pair.before - s4 * avg_dt) / crosstalk) / after)
}

/// Stage A: εd/εa.
///
/// `εRatio = (avgDT - S1·avgDD - (1 - S1·S4)·S2·avgAA) / ((1 - S1·S4)·S2·avgAA·Ebl)`
///
/// All four bleed-through factors must be set, S3 included, although the
/// formula does not use it.
#[instrument(skip(factors, means, bleaching))]
pub fn epsilon_ratio(
    factors: &CalibrationFactors,
    means: &ProductionMeans,
    bleaching: &BleachingEfficiency,
) -> Result<f64> {
    let s1 = required(factors.s1, "S1")?;
    let s2 = required(factors.s2, "S2")?;
    required(factors.s3, "S3")?;
    let s4 = required(factors.s4, "S4")?;

    let e_bl = match bleaching {
        BleachingEfficiency::Photobleaching(pair) => bleaching_efficiency(pair, s1, s4, means.transfer)?,
        BleachingEfficiency::Manual(e) => *e,
    };
    info!("Photobleaching FRET efficiency: {:.3}", e_bl);

    let crosstalk = 1.0 - s1 * s4;
    let numerator = means.transfer - s1 * means.donor - crosstalk * s2 * means.acceptor;
    let denominator = nonzero(
        crosstalk * s2 * means.acceptor * e_bl,
        "(1 - S1·S4)·S2·avgAA·Ebl",
    )?;
    let ratio = numerator / denominator;
    info!("Epsilon ratio (εd/εa): {:.3}", ratio);
    Ok(ratio)
}

/// Stage B inputs. Every value is user supplied; `epsilon_ratio` may come
/// from [`epsilon_ratio`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlphaInputs {
    /// Mean donor-channel intensity of the donor-only sample
    pub i1: Option<f64>,
    /// Mean transfer-channel intensity of the acceptor-only sample
    pub i2: Option<f64>,
    /// Dye molecules per donor-labelled antibody
    pub ld: Option<f64>,
    /// Dye molecules per acceptor-labelled antibody
    pub la: Option<f64>,
    /// Donor-labelled receptors per cell
    pub bd: Option<f64>,
    /// Acceptor-labelled receptors per cell
    pub ba: Option<f64>,
    pub epsilon_ratio: Option<f64>,
}

/// Stage B: `α = I2·Ld·Bd·εRatio / (I1·La·Ba)`
pub fn compute_alpha(inputs: &AlphaInputs) -> Result<f64> {
    let i1 = required(inputs.i1, "I1")?;
    let i2 = required(inputs.i2, "I2")?;
    let ld = required(inputs.ld, "Ld")?;
    let la = required(inputs.la, "La")?;
    let bd = required(inputs.bd, "Bd")?;
    let ba = required(inputs.ba, "Ba")?;
    let eps = required(inputs.epsilon_ratio, "epsilon ratio")?;

    let denominator = nonzero(i1 * la * ba, "I1·La·Ba")?;
    let alpha = i2 * ld * bd * eps / denominator;
    info!("alpha = {:.3}", alpha);
    Ok(alpha)
}
