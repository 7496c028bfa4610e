//! Zeiss LSM / multi-page TIFF reader built on the `tiff` crate.
//!
//! LSM files are TIFF containers: every full-resolution IFD is one slice and
//! carries all channels as samples (chunky or planar). Reduced-resolution
//! thumbnail IFDs are interleaved with the data IFDs and are skipped.
//! Plain TIFF stacks written with one sample per page (channel varying
//! fastest) are handled through `with_page_channels`.

use std::io::Cursor;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::image::reader::StackReader;
use crate::fret_pipeline::image::types::ChannelImage;

/// TIFF `PlanarConfiguration` value for separate sample planes.
const PLANAR_SEPARATE: u32 = 2;

/// `NewSubfileType` bit flagging a reduced-resolution (thumbnail) image.
const REDUCED_RESOLUTION: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct LsmReader {
    page_channels: usize,
}

impl Default for LsmReader {
    fn default() -> Self {
        Self { page_channels: 1 }
    }
}

impl LsmReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// For single-sample files: consecutive pages cycle through
    /// `channels` channels (c0 s0, c1 s0, c2 s0, c0 s1, ...).
    pub fn with_page_channels(channels: usize) -> Self {
        Self {
            page_channels: channels.max(1),
        }
    }
}

struct Page {
    width: usize,
    height: usize,
    planes: Vec<Vec<f32>>,
}

fn decode_err(e: tiff::TiffError) -> FretError {
    FretError::DecodeError(e.to_string())
}

fn to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|p| p as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|p| p as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|p| p as f32).collect(),
        _ => {
            return Err(FretError::UnsupportedFormat(
                "sample type not convertible to 32-bit float".to_string(),
            ));
        }
    })
}

/// Splits decoded samples into one plane per sample.
fn split_samples(
    samples: Vec<f32>,
    pixel_count: usize,
    samples_per_pixel: usize,
    planar: bool,
) -> Result<Vec<Vec<f32>>> {
    if samples.len() != pixel_count * samples_per_pixel {
        return Err(FretError::UnsupportedFormat(format!(
            "decoded {} samples, expected {} ({} per pixel)",
            samples.len(),
            pixel_count * samples_per_pixel,
            samples_per_pixel
        )));
    }
    if samples_per_pixel == 1 {
        return Ok(vec![samples]);
    }
    if planar {
        return Ok(samples
            .chunks_exact(pixel_count)
            .map(<[f32]>::to_vec)
            .collect());
    }
    let mut planes = vec![Vec::with_capacity(pixel_count); samples_per_pixel];
    for pixel in samples.chunks_exact(samples_per_pixel) {
        for (plane, &value) in planes.iter_mut().zip(pixel) {
            plane.push(value);
        }
    }
    Ok(planes)
}

impl LsmReader {
    fn read_pages(&self, data: &[u8]) -> Result<Vec<Page>> {
        let mut decoder = Decoder::new(Cursor::new(data)).map_err(decode_err)?;
        let mut pages = Vec::new();

        loop {
            let subfile = decoder.get_tag_u32(Tag::NewSubfileType).unwrap_or(0);
            if subfile & REDUCED_RESOLUTION == 0 {
                let (w, h) = decoder.dimensions().map_err(decode_err)?;
                let (width, height) = (w as usize, h as usize);
                let samples_per_pixel =
                    decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
                let planar = decoder
                    .get_tag_u32(Tag::PlanarConfiguration)
                    .map(|v| v == PLANAR_SEPARATE)
                    .unwrap_or(false);
                let samples = to_f32(decoder.read_image().map_err(decode_err)?)?;
                let planes = split_samples(samples, width * height, samples_per_pixel, planar)?;
                debug!(
                    "Decoded page {}: {}x{}, {} sample(s){}",
                    pages.len() + 1,
                    width,
                    height,
                    samples_per_pixel,
                    if planar { " (planar)" } else { "" }
                );
                pages.push(Page { width, height, planes });
            } else {
                debug!("Skipping thumbnail IFD");
            }

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(decode_err)?;
        }

        Ok(pages)
    }
}

impl StackReader for LsmReader {
    fn read_channels(&self, data: &[u8]) -> Result<Vec<ChannelImage>> {
        debug!("Decoding LSM/TIFF stack, {} bytes", data.len());
        let pages = self.read_pages(data)?;
        let first = pages
            .first()
            .ok_or_else(|| FretError::DecodeError("file contains no image data".to_string()))?;
        let (width, height) = (first.width, first.height);
        let samples = first.planes.len();

        if pages
            .iter()
            .any(|p| p.width != width || p.height != height || p.planes.len() != samples)
        {
            return Err(FretError::InvalidGeometry(
                "pages of the stack differ in size or sample count".to_string(),
            ));
        }

        let channel_count = if samples == 1 { self.page_channels } else { samples };
        let mut channels: Vec<Vec<Vec<f32>>> = vec![Vec::new(); channel_count];

        if samples == 1 {
            if pages.len() % channel_count != 0 {
                return Err(FretError::InvalidGeometry(format!(
                    "{} pages cannot be split into {} channels",
                    pages.len(),
                    channel_count
                )));
            }
            for (i, page) in pages.into_iter().enumerate() {
                channels[i % channel_count].extend(page.planes);
            }
        } else {
            for page in pages {
                for (channel, plane) in channels.iter_mut().zip(page.planes) {
                    channel.push(plane);
                }
            }
        }

        debug!(
            "Stack decoded: {} channel(s), {} slice(s), {}x{}",
            channel_count,
            channels[0].len(),
            width,
            height
        );

        channels
            .into_iter()
            .map(|slices| ChannelImage::new(width, height, slices))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunky() {
        let planes = split_samples(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, false).unwrap();
        assert_eq!(planes, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
    }

    #[test]
    fn test_split_planar() {
        let planes = split_samples(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, true).unwrap();
        assert_eq!(planes, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_split_length_mismatch() {
        let result = split_samples(vec![1.0; 5], 2, 3, false);
        assert!(matches!(result, Err(FretError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = LsmReader::new().read_channels(b"definitely not a tiff");
        assert!(matches!(result, Err(FretError::DecodeError(_))));
    }

    #[test]
    fn test_reads_rgb_tiff_as_three_channels() {
        let mut buffer = Vec::new();
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer)).unwrap();
            // 2x1 image, samples (a, t, d) per pixel
            let data: Vec<u16> = vec![10, 20, 30, 11, 21, 31];
            encoder
                .write_image::<tiff::encoder::colortype::RGB16>(2, 1, &data)
                .unwrap();
        }

        let channels = LsmReader::new().read_channels(&buffer).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].slices[0], vec![10.0, 11.0]);
        assert_eq!(channels[1].slices[0], vec![20.0, 21.0]);
        assert_eq!(channels[2].slices[0], vec![30.0, 31.0]);
    }

    #[test]
    fn test_reads_paged_gray_stack() {
        let mut buffer = Vec::new();
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer)).unwrap();
            for value in [1.0f32, 2.0, 3.0] {
                encoder
                    .write_image::<tiff::encoder::colortype::Gray32Float>(2, 2, &[value; 4])
                    .unwrap();
            }
        }

        let channels = LsmReader::with_page_channels(3).read_channels(&buffer).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[2].slices, vec![vec![3.0; 4]]);

        let result = LsmReader::with_page_channels(2).read_channels(&buffer);
        assert!(matches!(result, Err(FretError::InvalidGeometry(_))));
    }
}
