//! Calibration module
//!
//! Estimators for the bleed-through factors S1–S4 and the normalisation
//! factor alpha, each run against its own control-sample images.

pub mod alpha;
pub mod ratios;
pub mod types;

pub use alpha::{
    AlphaInputs, BleachingEfficiency, PhotobleachingPair, ProductionMeans, bleaching_efficiency,
    compute_alpha, epsilon_ratio,
};
pub use ratios::{
    ChannelMeans, ControlSample, RatioEstimate, RatioImages, estimate_ratios, estimate_s1_s3,
    estimate_s2_s4, ratio_images,
};
pub use types::{CalibrationFactors, NumericAnomaly, ResolvedFactors};
