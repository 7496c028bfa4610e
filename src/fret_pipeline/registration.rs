//! Translational registration by phase correlation.
//!
//! The correlation surface is the inverse 2D FFT of the (optionally
//! whitened) cross-power spectrum `F_moving * conj(F_reference)`. Its maximum
//! sits at the displacement of the moving image relative to the reference,
//! with indices past half the width/height folded to negative offsets.
//! Alignment repeats correlate-and-shift until the peak lands on the origin.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use tracing::{debug, info, instrument, warn};

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::common::stats::NanMean;
use crate::fret_pipeline::config::RegistrationConfig;
use crate::fret_pipeline::image::ChannelImage;

/// Integer pixel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shift {
    pub dx: i64,
    pub dy: i64,
}

impl Shift {
    pub fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Result of an iterative alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Total displacement of the moving image that was detected (and undone)
    pub displacement: Shift,
    /// Correlation rounds run, including the final one that found no shift
    pub iterations: usize,
}

pub struct Registrator {
    config: RegistrationConfig,
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    column_forward: Arc<dyn Fft<f32>>,
    column_inverse: Arc<dyn Fft<f32>>,
}

impl Registrator {
    pub fn new(width: usize, height: usize, config: RegistrationConfig) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            config,
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            column_forward: planner.plan_fft_forward(height),
            column_inverse: planner.plan_fft_inverse(height),
        }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Mean-centred copy with NaN replaced by the centre value.
    fn prepare(&self, image: &[f32]) -> Vec<Complex<f32>> {
        let mean = image.iter().copied().collect::<NanMean>().mean().unwrap_or(0.0) as f32;
        image
            .iter()
            .map(|&v| {
                let centred = if v.is_nan() { 0.0 } else { v - mean };
                Complex::new(centred, 0.0)
            })
            .collect()
    }

    fn transform_2d(&self, data: &mut [Complex<f32>], rows: &dyn Fft<f32>, columns: &dyn Fft<f32>) {
        let (w, h) = (self.width, self.height);
        for row in data.chunks_exact_mut(w) {
            rows.process(row);
        }
        let mut column = vec![Complex::new(0.0, 0.0); h];
        for x in 0..w {
            for y in 0..h {
                column[y] = data[y * w + x];
            }
            columns.process(&mut column);
            for y in 0..h {
                data[y * w + x] = column[y];
            }
        }
    }

    fn correlation_surface(&self, reference: &[f32], moving: &[f32]) -> Vec<f32> {
        let mut ref_fft = self.prepare(reference);
        let mut mov_fft = self.prepare(moving);
        self.transform_2d(&mut ref_fft, self.row_forward.as_ref(), self.column_forward.as_ref());
        self.transform_2d(&mut mov_fft, self.row_forward.as_ref(), self.column_forward.as_ref());

        let mut cross: Vec<Complex<f32>> = mov_fft
            .iter()
            .zip(ref_fft.iter())
            .map(|(&m, &r)| {
                let product = m * r.conj();
                if !self.config.normalize_cross_power {
                    return product;
                }
                let magnitude = product.norm();
                if magnitude > 1e-10 {
                    product / magnitude
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        self.transform_2d(&mut cross, self.row_inverse.as_ref(), self.column_inverse.as_ref());
        cross.iter().map(|c| c.re).collect()
    }

    /// Displacement of `moving` relative to `reference` for one slice.
    ///
    /// `Shift::default()` means the images are already aligned, which is also
    /// the answer for featureless input.
    pub fn estimate_shift(&self, reference: &[f32], moving: &[f32]) -> Result<Shift> {
        let expected = self.width * self.height;
        if reference.len() != expected || moving.len() != expected {
            return Err(FretError::InvalidGeometry(format!(
                "registration expects {}x{} slices",
                self.width, self.height
            )));
        }

        let correlation = self.correlation_surface(reference, moving);

        // strict `>` keeps the origin on ties
        let mut peak = 0usize;
        for (i, &v) in correlation.iter().enumerate() {
            if v > correlation[peak] {
                peak = i;
            }
        }
        let (px, py) = (peak % self.width, peak / self.width);

        let dx = if px > self.width / 2 {
            px as i64 - self.width as i64
        } else {
            px as i64
        };
        let dy = if py > self.height / 2 {
            py as i64 - self.height as i64
        } else {
            py as i64
        };

        debug!("Correlation peak at ({}, {}) -> shift ({}, {})", px, py, dx, dy);
        Ok(Shift::new(dx, dy))
    }

    /// Shifts `moving` onto `reference` until the correlation peak is at the
    /// origin.
    ///
    /// The shift is estimated on `reference_slice` and applied to every
    /// slice. On `RegistrationDidNotConverge` the shifts made so far stay
    /// applied.
    #[instrument(skip(self, reference, moving))]
    pub fn align(&self, reference: &ChannelImage, moving: &mut ChannelImage) -> Result<RegistrationOutcome> {
        reference.ensure_same_geometry(moving, "registration pair")?;
        if reference.width != self.width || reference.height != self.height {
            return Err(FretError::InvalidGeometry(format!(
                "registrator planned for {}x{}, got {}x{}",
                self.width, self.height, reference.width, reference.height
            )));
        }

        let slice = self.config.reference_slice;
        let reference_pixels = reference.slice(slice)?;
        let max_iterations = self.config.max_iterations.max(1);

        let mut displacement = Shift::default();
        let mut visited = vec![displacement];
        let mut last_shift = Shift::default();

        for iteration in 1..=max_iterations {
            let shift = self.estimate_shift(reference_pixels, moving.slice(slice)?)?;
            if shift.is_zero() {
                info!(
                    "Registration converged after {} iteration(s), displacement ({}, {})",
                    iteration, displacement.dx, displacement.dy
                );
                return Ok(RegistrationOutcome {
                    displacement,
                    iterations: iteration,
                });
            }

            translate(moving, -shift.dx, -shift.dy);
            displacement.dx += shift.dx;
            displacement.dy += shift.dy;
            last_shift = shift;
            debug!(
                "Iteration {}: shifted by ({}, {}), total ({}, {})",
                iteration, -shift.dx, -shift.dy, displacement.dx, displacement.dy
            );

            if visited.contains(&displacement) {
                warn!(
                    "Registration oscillates around ({}, {})",
                    displacement.dx, displacement.dy
                );
                return Err(FretError::RegistrationDidNotConverge {
                    iterations: iteration,
                    last_shift: (last_shift.dx, last_shift.dy),
                });
            }
            visited.push(displacement);
        }

        warn!("Registration stopped after {} iterations", max_iterations);
        Err(FretError::RegistrationDidNotConverge {
            iterations: max_iterations,
            last_shift: (last_shift.dx, last_shift.dy),
        })
    }
}

/// Moves the content of every slice by `(dx, dy)`.
///
/// Pixels shifted past the border are dropped and the vacated rows/columns
/// are set to zero.
pub fn translate(image: &mut ChannelImage, dx: i64, dy: i64) {
    if dx == 0 && dy == 0 {
        return;
    }
    let (w, h) = (image.width as i64, image.height as i64);
    for slice in image.slices.iter_mut() {
        let source = slice.clone();
        for y in 0..h {
            let sy = y - dy;
            for x in 0..w {
                let sx = x - dx;
                slice[(y * w + x) as usize] = if sx >= 0 && sx < w && sy >= 0 && sy < h {
                    source[(sy * w + sx) as usize]
                } else {
                    0.0
                };
            }
        }
    }
}
