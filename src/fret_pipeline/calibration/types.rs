//! Calibration factor types

use std::fmt;

use tracing::{info, warn};

use crate::fret_pipeline::common::error::{FretError, Result};

/// The five correction constants; each may still be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationFactors {
    pub s1: Option<f64>,
    pub s2: Option<f64>,
    pub s3: Option<f64>,
    pub s4: Option<f64>,
    pub alpha: Option<f64>,
}

/// Calibration factors with every value present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFactors {
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
    pub s4: f64,
    pub alpha: f64,
}

/// Out-of-range calibration value. Reported, never corrected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericAnomaly {
    /// S1, S2 or alpha is not strictly positive
    NonPositive { name: &'static str, value: f64 },
    /// S3 or S4 is negative
    Negative { name: &'static str, value: f64 },
}

impl fmt::Display for NumericAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericAnomaly::NonPositive { name, value } => {
                write!(f, "{} = {:.3} should be greater than 0", name, value)
            }
            NumericAnomaly::Negative { name, value } => {
                write!(f, "{} = {:.3} should not be negative", name, value)
            }
        }
    }
}

pub(crate) fn required(value: Option<f64>, name: &str) -> Result<f64> {
    value.ok_or_else(|| FretError::missing(name))
}

impl CalibrationFactors {
    pub fn new(s1: f64, s2: f64, s3: f64, s4: f64, alpha: f64) -> Self {
        Self {
            s1: Some(s1),
            s2: Some(s2),
            s3: Some(s3),
            s4: Some(s4),
            alpha: Some(alpha),
        }
    }

    /// Fails with `MissingInput` naming the first unset factor.
    pub fn resolve(&self) -> Result<ResolvedFactors> {
        Ok(ResolvedFactors {
            s1: required(self.s1, "S1")?,
            s2: required(self.s2, "S2")?,
            s3: required(self.s3, "S3")?,
            s4: required(self.s4, "S4")?,
            alpha: required(self.alpha, "alpha")?,
        })
    }

    pub fn anomalies(&self) -> Vec<NumericAnomaly> {
        let mut found = Vec::new();
        for (name, value) in [("S1", self.s1), ("S2", self.s2), ("alpha", self.alpha)] {
            if let Some(value) = value {
                if value.is_nan() || value <= 0.0 {
                    found.push(NumericAnomaly::NonPositive { name, value });
                }
            }
        }
        for (name, value) in [("S3", self.s3), ("S4", self.s4)] {
            if let Some(value) = value {
                if value < 0.0 {
                    found.push(NumericAnomaly::Negative { name, value });
                }
            }
        }
        found
    }

    /// Logs each anomaly as a warning and returns how many there were.
    pub fn warn_anomalies(&self) -> usize {
        let anomalies = self.anomalies();
        for anomaly in &anomalies {
            warn!("Unusual calibration factor: {}", anomaly);
        }
        anomalies.len()
    }

    pub fn log_summary(&self) {
        let show = |v: Option<f64>| v.map_or_else(|| "unset".to_string(), |v| format!("{:.3}", v));
        info!(
            "Calibration factors: S1={} S2={} S3={} S4={} alpha={}",
            show(self.s1),
            show(self.s2),
            show(self.s3),
            show(self.s4),
            show(self.alpha)
        );
    }
}
