//! Small numeric helpers shared by the correction and calibration steps.

/// Running mean over the finite-or-infinite, non-NaN values of an iterator.
///
/// NaN is the "excluded pixel" sentinel, so it never contributes to the sum
/// or the count.
#[derive(Debug, Default, Clone, Copy)]
pub struct NanMean {
    sum: f64,
    count: usize,
}

impl NanMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f32) {
        if !value.is_nan() {
            self.sum += value as f64;
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` when nothing was accumulated.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

impl FromIterator<f32> for NanMean {
    fn from_iter<I: IntoIterator<Item = f32>>(iter: I) -> Self {
        let mut acc = NanMean::new();
        for v in iter {
            acc.push(v);
        }
        acc
    }
}

/// `max(0, value)` that keeps NaN as NaN.
///
/// `f32::max` returns the non-NaN operand, which would turn excluded pixels
/// into zeros.
#[inline]
pub fn clamp_non_negative(value: f32) -> f32 {
    if value < 0.0 { 0.0 } else { value }
}
