use thiserror::Error;

#[derive(Error, Debug)]
pub enum FretError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("ROI contains no measurable pixels")]
    EmptyRoi,

    #[error("No valid pixels (donor > 0, transfer >= 0, acceptor >= 0) in the calibration images")]
    NoValidPixels,

    #[error("Registration did not converge after {iterations} iterations (last shift: dx={}, dy={})", last_shift.0, last_shift.1)]
    RegistrationDidNotConverge {
        iterations: usize,
        last_shift: (i64, i64),
    },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode TIFF image: {0}")]
    EncodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FretError {
    pub fn missing(what: impl Into<String>) -> Self {
        FretError::MissingInput(what.into())
    }
}

pub type Result<T> = std::result::Result<T, FretError>;
