//! Pipeline configuration types

/// TIFF compression methods for exported images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

/// Inclusive `[min, max]` band of accepted FRET efficiencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBand {
    pub min: f32,
    pub max: f32,
}

impl ThresholdBand {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// NaN is never inside the band.
    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// How the "Not NaN p." column of the results table counts pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidPixelPolicy {
    /// Count pixels with `value >= -1`. Slightly negative efficiencies
    /// still count as valid; NaN and values below -1 do not.
    #[default]
    LegacyAboveMinusOne,
    /// Count every pixel that is not NaN.
    StrictNotNan,
}

impl ValidPixelPolicy {
    #[inline]
    pub fn is_valid(&self, value: f32) -> bool {
        match self {
            ValidPixelPolicy::LegacyAboveMinusOne => value >= -1.0,
            ValidPixelPolicy::StrictNotNan => !value.is_nan(),
        }
    }
}

/// Iterative phase-correlation registration settings
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationConfig {
    /// Upper bound on correlate/shift rounds before giving up
    pub max_iterations: usize,
    /// Whiten the cross-power spectrum (phase correlation) instead of
    /// plain cross-correlation
    pub normalize_cross_power: bool,
    /// Slice used to estimate the shift; the shift is applied to all slices
    pub reference_slice: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            normalize_cross_power: true,
            reference_slice: 0,
        }
    }
}

/// Configuration for a FRET session and the batch driver
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed offset added to the ROI background average before subtraction
    pub autofluorescence: f32,
    /// Efficiencies outside this band become NaN after composition
    pub auto_threshold: Option<ThresholdBand>,
    /// Counting rule for the "Not NaN p." column
    pub valid_pixel_policy: ValidPixelPolicy,
    /// Registration settings
    pub registration: RegistrationConfig,
    /// Blur radius used by the batch driver; `None` skips blurring
    pub blur_radius: Option<f64>,
    /// The batch background ROI is the top-left `1/n` x `1/n` corner
    pub background_fraction: usize,
    /// Compression for exported FRET images
    pub export_compression: TiffCompression,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            autofluorescence: 0.0,
            auto_threshold: None,
            valid_pixel_policy: ValidPixelPolicy::default(),
            registration: RegistrationConfig::default(),
            blur_radius: None,
            background_fraction: 6,
            export_compression: TiffCompression::None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    autofluorescence: Option<f32>,
    auto_threshold: Option<Option<ThresholdBand>>,
    valid_pixel_policy: Option<ValidPixelPolicy>,
    registration: Option<RegistrationConfig>,
    blur_radius: Option<Option<f64>>,
    background_fraction: Option<usize>,
    export_compression: Option<TiffCompression>,
}

impl PipelineConfigBuilder {
    pub fn autofluorescence(mut self, offset: f32) -> Self {
        self.autofluorescence = Some(offset);
        self
    }

    pub fn auto_threshold(mut self, band: Option<ThresholdBand>) -> Self {
        self.auto_threshold = Some(band);
        self
    }

    pub fn valid_pixel_policy(mut self, policy: ValidPixelPolicy) -> Self {
        self.valid_pixel_policy = Some(policy);
        self
    }

    pub fn registration(mut self, registration: RegistrationConfig) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn blur_radius(mut self, radius: Option<f64>) -> Self {
        self.blur_radius = Some(radius);
        self
    }

    pub fn background_fraction(mut self, fraction: usize) -> Self {
        self.background_fraction = Some(fraction);
        self
    }

    pub fn export_compression(mut self, compression: TiffCompression) -> Self {
        self.export_compression = Some(compression);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        PipelineConfig {
            autofluorescence: self.autofluorescence.unwrap_or(default.autofluorescence),
            auto_threshold: self.auto_threshold.unwrap_or(default.auto_threshold),
            valid_pixel_policy: self.valid_pixel_policy.unwrap_or(default.valid_pixel_policy),
            registration: self.registration.unwrap_or(default.registration),
            blur_radius: self.blur_radius.unwrap_or(default.blur_radius),
            background_fraction: self.background_fraction.unwrap_or(default.background_fraction).max(1),
            export_compression: self.export_compression.unwrap_or(default.export_compression),
        }
    }
}
