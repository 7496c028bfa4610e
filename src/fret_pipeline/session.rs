//! FRET session: one donor, transfer and acceptor image plus the derived
//! FRET image, owned together and mutated only through the operations below.

use std::fmt;
use std::io::Write;

use tracing::{error, info, warn};

use crate::fret_pipeline::background::{subtract_background, zero_fill_roi};
use crate::fret_pipeline::calibration::{
    CalibrationFactors, ControlSample, ProductionMeans, RatioEstimate, estimate_ratios,
};
use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::config::{PipelineConfig, ThresholdBand};
use crate::fret_pipeline::fret::FretComposer;
use crate::fret_pipeline::image::{ChannelFilter, ChannelImage, GaussianBlur, Roi, TiffWriter};
use crate::fret_pipeline::measurement::{ResultsTable, Statistics, measure};
use crate::fret_pipeline::registration::{RegistrationOutcome, Registrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Donor,
    Transfer,
    Acceptor,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 3] = [ChannelRole::Donor, ChannelRole::Transfer, ChannelRole::Acceptor];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelRole::Donor => "donor",
            ChannelRole::Transfer => "transfer",
            ChannelRole::Acceptor => "acceptor",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A channel image bound to a role, with its correction markers.
#[derive(Debug, Clone)]
pub struct BoundChannel {
    pub label: String,
    image: ChannelImage,
    roi: Option<Roi>,
    /// Pixel data right after background subtraction
    snapshot: Option<ChannelImage>,
    background: Option<Vec<f64>>,
    thresholded: bool,
    blurred: bool,
}

impl BoundChannel {
    fn new(label: String, image: ChannelImage) -> Self {
        Self {
            label,
            image,
            roi: None,
            snapshot: None,
            background: None,
            thresholded: false,
            blurred: false,
        }
    }

    pub fn image(&self) -> &ChannelImage {
        &self.image
    }

    pub fn roi(&self) -> Option<&Roi> {
        self.roi.as_ref()
    }

    pub fn is_corrected(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_thresholded(&self) -> bool {
        self.thresholded
    }

    pub fn is_blurred(&self) -> bool {
        self.blurred
    }

    /// Per-slice ROI background averages of the last subtraction.
    pub fn background_averages(&self) -> Option<&[f64]> {
        self.background.as_deref()
    }
}

/// The derived FRET efficiency image and the ROI drawn on it.
#[derive(Debug, Clone)]
pub struct FretImage {
    pub image: ChannelImage,
    pub roi: Option<Roi>,
}

/// Explicit session operations, dispatched by [`Session::execute`].
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Bind {
        role: ChannelRole,
        label: String,
        image: ChannelImage,
    },
    Release(ChannelRole),
    SetRoi {
        role: ChannelRole,
        roi: Option<Roi>,
    },
    CopyRoi(ChannelRole),
    SubtractBackground(ChannelRole),
    Reset(ChannelRole),
    Threshold {
        role: ChannelRole,
        band: ThresholdBand,
    },
    Blur {
        role: ChannelRole,
        radius: f64,
    },
    Register,
    ComposeFret {
        label: String,
    },
    Measure {
        slice: usize,
        label: String,
    },
    EstimateRatios(ControlSample),
    SetFactors(CalibrationFactors),
    ResetSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Done,
    Background(Vec<f64>),
    Registered {
        transfer: RegistrationOutcome,
        acceptor: RegistrationOutcome,
    },
    Measured(Statistics),
    Ratios(RatioEstimate),
}

#[derive(Debug, Default)]
pub struct Session {
    config: PipelineConfig,
    factors: CalibrationFactors,
    donor: Option<BoundChannel>,
    transfer: Option<BoundChannel>,
    acceptor: Option<BoundChannel>,
    fret: Option<FretImage>,
    results: ResultsTable,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    pub fn factors(&self) -> &CalibrationFactors {
        &self.factors
    }

    pub fn set_factors(&mut self, factors: CalibrationFactors) {
        self.factors = factors;
        self.factors.log_summary();
        self.factors.warn_anomalies();
    }

    pub fn results(&self) -> &ResultsTable {
        &self.results
    }

    pub fn fret(&self) -> Option<&FretImage> {
        self.fret.as_ref()
    }

    fn slot(&self, role: ChannelRole) -> &Option<BoundChannel> {
        match role {
            ChannelRole::Donor => &self.donor,
            ChannelRole::Transfer => &self.transfer,
            ChannelRole::Acceptor => &self.acceptor,
        }
    }

    fn slot_mut(&mut self, role: ChannelRole) -> &mut Option<BoundChannel> {
        match role {
            ChannelRole::Donor => &mut self.donor,
            ChannelRole::Transfer => &mut self.transfer,
            ChannelRole::Acceptor => &mut self.acceptor,
        }
    }

    pub fn channel(&self, role: ChannelRole) -> Result<&BoundChannel> {
        self.slot(role)
            .as_ref()
            .ok_or_else(|| FretError::missing(format!("{} image", role)))
    }

    fn channel_mut(&mut self, role: ChannelRole) -> Result<&mut BoundChannel> {
        self.slot_mut(role)
            .as_mut()
            .ok_or_else(|| FretError::missing(format!("{} image", role)))
    }

    pub fn is_bound(&self, role: ChannelRole) -> bool {
        self.slot(role).is_some()
    }

    /// Binds `image` to `role`. The image must match the size and slice
    /// count of the channels bound to the other roles; on mismatch nothing
    /// changes.
    pub fn bind(&mut self, role: ChannelRole, label: impl Into<String>, image: ChannelImage) -> Result<()> {
        for other in ChannelRole::ALL.into_iter().filter(|&r| r != role) {
            if let Some(bound) = self.slot(other) {
                image.ensure_same_geometry(&bound.image, &format!("{} vs {} image", role, other))?;
            }
        }
        let label = label.into();
        info!(
            "Bound {} image '{}' ({}x{}, {} slice(s))",
            role,
            label,
            image.width,
            image.height,
            image.slice_count()
        );
        *self.slot_mut(role) = Some(BoundChannel::new(label, image));
        Ok(())
    }

    pub fn release(&mut self, role: ChannelRole) -> Option<BoundChannel> {
        self.slot_mut(role).take()
    }

    /// Drops all images and the FRET image. Results and factors are kept.
    pub fn reset_session(&mut self) {
        self.donor = None;
        self.transfer = None;
        self.acceptor = None;
        self.fret = None;
        info!("Session reset");
    }

    pub fn set_roi(&mut self, role: ChannelRole, roi: Option<Roi>) -> Result<()> {
        self.channel_mut(role)?.roi = roi;
        Ok(())
    }

    pub fn set_fret_roi(&mut self, roi: Option<Roi>) -> Result<()> {
        let fret = self.fret.as_mut().ok_or_else(|| FretError::missing("FRET image"))?;
        fret.roi = roi;
        Ok(())
    }

    /// Copies the ROI of `from` onto the other bound channels.
    pub fn copy_roi(&mut self, from: ChannelRole) -> Result<()> {
        let roi = self
            .channel(from)?
            .roi
            .clone()
            .ok_or_else(|| FretError::missing(format!("ROI on {} image", from)))?;
        for role in ChannelRole::ALL.into_iter().filter(|&r| r != from) {
            if let Some(bound) = self.slot_mut(role).as_mut() {
                bound.roi = Some(roi.clone());
            }
        }
        Ok(())
    }

    pub fn clear_rois(&mut self) {
        for role in ChannelRole::ALL {
            if let Some(bound) = self.slot_mut(role).as_mut() {
                bound.roi = None;
            }
        }
    }

    /// Subtracts the ROI background of `role` and keeps a snapshot of the
    /// result for [`Session::reset`]. The ROI is cleared afterwards.
    pub fn subtract_background(&mut self, role: ChannelRole) -> Result<Vec<f64>> {
        let autofluorescence = self.config.autofluorescence;
        let bound = self.channel_mut(role)?;
        let roi = bound
            .roi
            .as_ref()
            .ok_or_else(|| FretError::missing(format!("ROI on {} image", role)))?;
        if bound.snapshot.is_some() {
            warn!("{} image is already background corrected, subtracting again", role);
        }

        let correction = subtract_background(&bound.image, Some(roi), autofluorescence)?;
        info!("{} background: {:.1}", role, correction.averages[0]);

        bound.snapshot = Some(correction.image.clone());
        bound.image = correction.image;
        bound.background = Some(correction.averages.clone());
        bound.thresholded = false;
        bound.blurred = false;
        bound.roi = None;
        Ok(correction.averages)
    }

    /// Zeroes the ROI area of `role`, in the working image and the
    /// post-subtraction snapshot alike.
    pub fn zero_fill(&mut self, role: ChannelRole, roi: &Roi) -> Result<()> {
        let bound = self.channel_mut(role)?;
        zero_fill_roi(&mut bound.image, roi);
        if let Some(snapshot) = bound.snapshot.as_mut() {
            zero_fill_roi(snapshot, roi);
        }
        Ok(())
    }

    /// Restores the post-subtraction snapshot, undoing blur and threshold.
    pub fn reset(&mut self, role: ChannelRole) -> Result<()> {
        let bound = self.channel_mut(role)?;
        let snapshot = bound
            .snapshot
            .as_ref()
            .ok_or_else(|| FretError::missing(format!("background-corrected {} image", role)))?;
        bound.image = snapshot.clone();
        bound.thresholded = false;
        bound.blurred = false;
        info!("{} image reset to its background-corrected state", role);
        Ok(())
    }

    /// Sets pixels outside the inclusive band to NaN.
    pub fn threshold_channel(&mut self, role: ChannelRole, band: ThresholdBand) -> Result<usize> {
        let bound = self.channel_mut(role)?;
        let mut excluded = 0;
        for p in bound.image.slices.iter_mut().flatten() {
            if !p.is_nan() && !band.contains(*p) {
                *p = f32::NAN;
                excluded += 1;
            }
        }
        bound.thresholded = true;
        info!("{} image thresholded to [{}, {}], {} pixel(s) excluded", role, band.min, band.max, excluded);
        Ok(excluded)
    }

    pub fn blur_channel(&mut self, role: ChannelRole, filter: &dyn ChannelFilter, radius: f64) -> Result<()> {
        let bound = self.channel_mut(role)?;
        filter.apply(&mut bound.image, radius)?;
        bound.blurred = true;
        Ok(())
    }

    /// Aligns the transfer and the acceptor image onto the donor image.
    ///
    /// All three images must be bound before anything moves. The two pairs
    /// are aligned independently: a pair that does not converge is logged
    /// and the other pair still runs. The first failure is returned.
    pub fn register_channels(&mut self) -> Result<(RegistrationOutcome, RegistrationOutcome)> {
        if let Some(missing) = ChannelRole::ALL.into_iter().find(|&r| !self.is_bound(r)) {
            return Err(FretError::missing(format!("{} image", missing)));
        }
        let donor = self.donor.as_ref().ok_or_else(|| FretError::missing("donor image"))?;
        let transfer = self.transfer.as_mut().ok_or_else(|| FretError::missing("transfer image"))?;
        let acceptor = self.acceptor.as_mut().ok_or_else(|| FretError::missing("acceptor image"))?;
        let registrator = Registrator::new(donor.image.width, donor.image.height, self.config.registration.clone());

        let transfer_result = registrator.align(&donor.image, &mut transfer.image);
        if let Err(e) = &transfer_result {
            error!("transfer registration: {}", e);
        }
        let acceptor_result = registrator.align(&donor.image, &mut acceptor.image);
        if let Err(e) = &acceptor_result {
            error!("acceptor registration: {}", e);
        }
        let (transfer_outcome, acceptor_outcome) = (transfer_result?, acceptor_result?);

        info!(
            "Registered transfer by ({}, {}) and acceptor by ({}, {})",
            -transfer_outcome.displacement.dx,
            -transfer_outcome.displacement.dy,
            -acceptor_outcome.displacement.dx,
            -acceptor_outcome.displacement.dy
        );
        Ok((transfer_outcome, acceptor_outcome))
    }

    fn bound_triplet(&self) -> Result<(&BoundChannel, &BoundChannel, &BoundChannel)> {
        Ok((
            self.channel(ChannelRole::Donor)?,
            self.channel(ChannelRole::Transfer)?,
            self.channel(ChannelRole::Acceptor)?,
        ))
    }

    /// Composes a new FRET image, replacing the previous one, and appends
    /// the first-slice measurement to the results table.
    ///
    /// The ROI of the previous FRET image, if any, carries over to the new
    /// one and is copied back onto all three channels; without one their
    /// ROIs are cleared.
    pub fn compose_fret(&mut self, label: impl Into<String>) -> Result<Statistics> {
        let composer = FretComposer::new(self.config.auto_threshold, self.config.valid_pixel_policy);
        let roi = self.fret.as_ref().and_then(|f| f.roi.clone());

        let (donor, transfer, acceptor) = self.bound_triplet()?;
        let composition = composer.compose(
            &donor.image,
            &transfer.image,
            &acceptor.image,
            &self.factors,
            roi.as_ref(),
        )?;

        if self.fret.is_some() {
            info!("Replacing previous FRET image");
        }
        self.fret = Some(FretImage {
            image: composition.image,
            roi: roi.clone(),
        });
        for role in ChannelRole::ALL {
            if let Some(bound) = self.slot_mut(role).as_mut() {
                bound.roi = roi.clone();
            }
        }

        self.results.push(label, composition.stats);
        Ok(composition.stats)
    }

    /// Measures `slice` of the current FRET image inside its ROI and
    /// appends a row.
    pub fn measure_fret(&mut self, slice: usize, label: impl Into<String>) -> Result<Statistics> {
        let fret = self.fret.as_ref().ok_or_else(|| FretError::missing("FRET image"))?;
        let stats = measure(&fret.image, slice, fret.roi.as_ref(), self.config.valid_pixel_policy)?;
        self.results.push(label, stats);
        Ok(stats)
    }

    /// Runs a ratio estimator on the bound images (a single-label control)
    /// and stores the resulting factors.
    pub fn estimate_ratios(&mut self, sample: ControlSample) -> Result<RatioEstimate> {
        let (donor, transfer, acceptor) = self.bound_triplet()?;
        let estimate = estimate_ratios(sample, &donor.image, &transfer.image, &acceptor.image)?;
        match sample {
            ControlSample::DonorOnly => {
                self.factors.s1 = Some(estimate.ratio_a);
                self.factors.s3 = Some(estimate.ratio_b);
            }
            ControlSample::AcceptorOnly => {
                self.factors.s2 = Some(estimate.ratio_a);
                self.factors.s4 = Some(estimate.ratio_b);
            }
        }
        self.factors.warn_anomalies();
        Ok(estimate)
    }

    /// S1 and S3 from a donor-only control bound to the session.
    pub fn estimate_donor_ratios(&mut self) -> Result<RatioEstimate> {
        self.estimate_ratios(ControlSample::DonorOnly)
    }

    /// S2 and S4 from an acceptor-only control bound to the session.
    pub fn estimate_acceptor_ratios(&mut self) -> Result<RatioEstimate> {
        self.estimate_ratios(ControlSample::AcceptorOnly)
    }

    /// Means of the bound (corrected) images, input of the epsilon ratio.
    pub fn production_means(&self) -> Result<ProductionMeans> {
        let (donor, transfer, acceptor) = self.bound_triplet()?;
        ProductionMeans::from_images(&donor.image, &transfer.image, &acceptor.image)
    }

    pub fn export_fret(&self, writer: &dyn TiffWriter, output: &mut dyn Write) -> Result<()> {
        let fret = self.fret.as_ref().ok_or_else(|| FretError::missing("FRET image"))?;
        writer.write_tiff(&fret.image, output, self.config.export_compression)
    }

    fn dispatch(&mut self, command: SessionCommand) -> Result<CommandOutcome> {
        match command {
            SessionCommand::Bind { role, label, image } => self.bind(role, label, image).map(|_| CommandOutcome::Done),
            SessionCommand::Release(role) => {
                self.release(role);
                Ok(CommandOutcome::Done)
            }
            SessionCommand::SetRoi { role, roi } => self.set_roi(role, roi).map(|_| CommandOutcome::Done),
            SessionCommand::CopyRoi(role) => self.copy_roi(role).map(|_| CommandOutcome::Done),
            SessionCommand::SubtractBackground(role) => self.subtract_background(role).map(CommandOutcome::Background),
            SessionCommand::Reset(role) => self.reset(role).map(|_| CommandOutcome::Done),
            SessionCommand::Threshold { role, band } => self.threshold_channel(role, band).map(|_| CommandOutcome::Done),
            SessionCommand::Blur { role, radius } => self.blur_channel(role, &GaussianBlur, radius).map(|_| CommandOutcome::Done),
            SessionCommand::Register => self
                .register_channels()
                .map(|(transfer, acceptor)| CommandOutcome::Registered { transfer, acceptor }),
            SessionCommand::ComposeFret { label } => self.compose_fret(label).map(CommandOutcome::Measured),
            SessionCommand::Measure { slice, label } => self.measure_fret(slice, label).map(CommandOutcome::Measured),
            SessionCommand::EstimateRatios(sample) => self.estimate_ratios(sample).map(CommandOutcome::Ratios),
            SessionCommand::SetFactors(factors) => {
                self.set_factors(factors);
                Ok(CommandOutcome::Done)
            }
            SessionCommand::ResetSession => {
                self.reset_session();
                Ok(CommandOutcome::Done)
            }
        }
    }

    /// Runs one command; failures are logged before being returned.
    pub fn execute(&mut self, command: SessionCommand) -> Result<CommandOutcome> {
        let result = self.dispatch(command);
        if let Err(e) = &result {
            error!("{}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests;
