use crate::fret_pipeline::common::error::Result;
use crate::fret_pipeline::image::types::ChannelImage;

pub trait StackReader {
    /// Decodes a multi-channel acquisition into one image per channel, in
    /// the order the file stores them.
    fn read_channels(&self, data: &[u8]) -> Result<Vec<ChannelImage>>;
}
