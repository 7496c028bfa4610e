//! Channel image data types

use crate::fret_pipeline::common::error::{FretError, Result};

/// One fluorescence channel: a stack of equally sized 32-bit float slices.
///
/// NaN marks excluded pixels and is carried through every stage untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelImage {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
    /// Row-major pixel data, one `Vec` per slice
    pub slices: Vec<Vec<f32>>,
}

impl ChannelImage {
    pub fn new(width: usize, height: usize, slices: Vec<Vec<f32>>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FretError::InvalidGeometry(format!(
                "image dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if slices.is_empty() {
            return Err(FretError::InvalidGeometry("image has no slices".to_string()));
        }
        if let Some((i, s)) = slices
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != width * height)
        {
            return Err(FretError::InvalidGeometry(format!(
                "slice {} holds {} pixels, expected {}x{}",
                i + 1,
                s.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, slices })
    }

    /// Single-slice image.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        Self::new(width, height, vec![pixels])
    }

    pub fn filled(width: usize, height: usize, slice_count: usize, value: f32) -> Self {
        Self {
            width,
            height,
            slices: vec![vec![value; width * height]; slice_count.max(1)],
        }
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn slice(&self, index: usize) -> Result<&[f32]> {
        self.slices.get(index).map(Vec::as_slice).ok_or_else(|| {
            FretError::InvalidGeometry(format!(
                "slice {} requested, image has {}",
                index + 1,
                self.slices.len()
            ))
        })
    }

    #[inline]
    pub fn get(&self, slice: usize, x: usize, y: usize) -> f32 {
        self.slices[slice][y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, slice: usize, x: usize, y: usize, value: f32) {
        self.slices[slice][y * self.width + x] = value;
    }

    pub fn same_geometry(&self, other: &ChannelImage) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.slice_count() == other.slice_count()
    }

    /// Fails with `InvalidGeometry` naming both images when they differ.
    pub fn ensure_same_geometry(&self, other: &ChannelImage, what: &str) -> Result<()> {
        if self.same_geometry(other) {
            return Ok(());
        }
        Err(FretError::InvalidGeometry(format!(
            "{}: {}x{}x{} vs {}x{}x{}",
            what,
            self.width,
            self.height,
            self.slice_count(),
            other.width,
            other.height,
            other.slice_count()
        )))
    }
}
