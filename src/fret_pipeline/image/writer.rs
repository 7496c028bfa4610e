use std::io::Write;
use crate::fret_pipeline::common::error::Result;
use crate::fret_pipeline::config::TiffCompression;
use crate::fret_pipeline::image::types::ChannelImage;

pub trait TiffWriter {
    fn write_tiff(&self, image: &ChannelImage, output: &mut dyn Write, compression: TiffCompression) -> Result<()>;
}
