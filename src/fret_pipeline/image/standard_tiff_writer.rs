use std::io::Write;
use tracing::debug;
use crate::fret_pipeline::common::error::{Result, FretError};
use crate::fret_pipeline::config::TiffCompression;
use crate::fret_pipeline::image::types::ChannelImage;
use crate::fret_pipeline::image::writer::TiffWriter;

/// Writes every slice as one 32-bit float grayscale page. NaN pixels are
/// stored as-is.
pub struct StandardTiffWriter;

impl TiffWriter for StandardTiffWriter {
    fn write_tiff(&self, image: &ChannelImage, output: &mut dyn Write, compression: TiffCompression) -> Result<()> {
        debug!(
            "Encoding float TIFF: {}x{}, {} slice(s)",
            image.width,
            image.height,
            image.slice_count()
        );

        let mut buffer = Vec::new();

        let compression = match compression {
            TiffCompression::None => tiff::encoder::Compression::Uncompressed,
            TiffCompression::Lzw => tiff::encoder::Compression::Lzw,
            TiffCompression::DeflateFast => tiff::encoder::Compression::Deflate(tiff::encoder::compression::DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => tiff::encoder::Compression::Deflate(tiff::encoder::compression::DeflateLevel::Balanced),
            TiffCompression::DeflateBest => tiff::encoder::Compression::Deflate(tiff::encoder::compression::DeflateLevel::Best),
        };

        {
            let mut encoder = tiff::encoder::TiffEncoder::new(std::io::Cursor::new(&mut buffer))
                .map_err(|e| FretError::EncodeError(e.to_string()))?
                .with_compression(compression);

            for slice in &image.slices {
                encoder.write_image::<tiff::encoder::colortype::Gray32Float>(
                    image.width as u32,
                    image.height as u32,
                    slice,
                ).map_err(|e| FretError::EncodeError(e.to_string()))?;
            }
        }

        output.write_all(&buffer)?;

        debug!("TIFF encoding complete, {} bytes", buffer.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fret_pipeline::image::{LsmReader, StackReader};

    #[test]
    fn test_written_stack_reads_back_with_nan() {
        let image = ChannelImage::new(
            2,
            1,
            vec![vec![0.25, f32::NAN], vec![0.5, 1.0]],
        ).unwrap();

        let mut out = Vec::new();
        StandardTiffWriter
            .write_tiff(&image, &mut out, TiffCompression::Lzw)
            .unwrap();

        let channels = LsmReader::new().read_channels(&out).unwrap();
        assert_eq!(channels.len(), 1);
        let back = &channels[0];
        assert_eq!(back.slice_count(), 2);
        assert_eq!(back.slices[0][0], 0.25);
        assert!(back.slices[0][1].is_nan());
        assert_eq!(back.slices[1], vec![0.5, 1.0]);
    }
}
