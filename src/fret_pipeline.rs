//! Ratiometric FRET pipeline module
//!
//! Background correction, phase-correlation registration, bleed-through and
//! alpha calibration, pixel-wise FRET composition and measurement, tied
//! together by an explicit [`Session`] and a directory [`BatchProcessor`].

pub mod background;
pub mod batch;
pub mod calibration;
pub mod common;
pub mod config;
pub mod fret;
pub mod image;
pub mod measurement;
pub mod registration;
pub mod session;

pub use common::{
    FretError,
    Result,
};

pub use config::{
    PipelineConfig,
    PipelineConfigBuilder,
    RegistrationConfig,
    ThresholdBand,
    TiffCompression,
    ValidPixelPolicy,
};

pub use image::{
    ChannelFilter,
    ChannelImage,
    GaussianBlur,
    LsmReader,
    Roi,
    StackReader,
    StandardTiffWriter,
    TiffWriter,
};

pub use calibration::{
    CalibrationFactors,
    ControlSample,
};

pub use batch::{
    BatchProcessor,
    BatchState,
};

pub use fret::FretComposer;
pub use measurement::{ResultsTable, Statistics};
pub use registration::{Registrator, Shift};
pub use session::{ChannelRole, CommandOutcome, Session, SessionCommand};
