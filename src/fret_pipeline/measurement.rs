//! Per-image statistics and the append-only results table.

use std::fmt::Write as _;
use std::io::Write;

use tracing::{info, warn};

use crate::fret_pipeline::common::error::Result;
use crate::fret_pipeline::config::ValidPixelPolicy;
use crate::fret_pipeline::image::{ChannelImage, Roi};

pub const COLUMNS: [&str; 8] = [
    "File",
    "Pixels",
    "Not NaN p.",
    "Mean",
    "Median",
    "Std. dev.",
    "Min",
    "Max",
];

/// Statistics of one slice, optionally restricted to an ROI.
///
/// `pixels` counts every pixel in the region and `not_nan` follows the
/// configured [`ValidPixelPolicy`]. The remaining values are computed over
/// the non-NaN pixels and are NaN when there are none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub pixels: usize,
    pub not_nan: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Statistics {
    pub fn from_slice(
        pixels: &[f32],
        width: usize,
        height: usize,
        roi: Option<&Roi>,
        policy: ValidPixelPolicy,
    ) -> Self {
        let region: Vec<f32> = match roi {
            Some(roi) => roi
                .pixel_indices(width, height)
                .into_iter()
                .map(|i| pixels[i])
                .collect(),
            None => pixels.to_vec(),
        };

        let not_nan = region.iter().filter(|&&v| policy.is_valid(v)).count();
        let mut values: Vec<f64> = region
            .iter()
            .filter(|v| !v.is_nan())
            .map(|&v| v as f64)
            .collect();

        if values.is_empty() {
            return Self {
                pixels: region.len(),
                not_nan,
                mean: f64::NAN,
                median: f64::NAN,
                std_dev: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }

        values.sort_by(f64::total_cmp);
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        Self {
            pixels: region.len(),
            not_nan,
            mean,
            median,
            std_dev,
            min: values[0],
            max: values[n - 1],
        }
    }
}

/// Statistics of `slice` of `image`.
pub fn measure(
    image: &ChannelImage,
    slice: usize,
    roi: Option<&Roi>,
    policy: ValidPixelPolicy,
) -> Result<Statistics> {
    let pixels = image.slice(slice)?;
    let stats = Statistics::from_slice(pixels, image.width, image.height, roi, policy);
    if stats.mean.is_nan() {
        warn!("Slice {} has no non-NaN pixels in the measured region", slice + 1);
    }
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub label: String,
    pub stats: Statistics,
}

/// Ordered, append-only table of measurements.
#[derive(Debug, Clone, Default)]
pub struct ResultsTable {
    rows: Vec<MeasurementRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row and returns its index.
    pub fn push(&mut self, label: impl Into<String>, stats: Statistics) -> usize {
        let row = MeasurementRow {
            label: label.into(),
            stats,
        };
        info!(
            "Measured {}: {} pixels, {} not NaN, mean {:.3}, median {:.3}, sd {:.3}, min {:.3}, max {:.3}",
            row.label,
            stats.pixels,
            stats.not_nan,
            stats.mean,
            stats.median,
            stats.std_dev,
            stats.min,
            stats.max
        );
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tab-separated text with a header line.
    pub fn to_tsv(&self) -> String {
        let mut out = COLUMNS.join("\t");
        out.push('\n');
        for row in &self.rows {
            let s = &row.stats;
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
                row.label, s.pixels, s.not_nan, s.mean, s.median, s.std_dev, s.min, s.max
            );
        }
        out
    }

    pub fn write_tsv(&self, output: &mut dyn Write) -> Result<()> {
        output.write_all(self.to_tsv().as_bytes())?;
        Ok(())
    }
}
