//! Channel image module
//!
//! Pixel buffers, ROI predicates and the I/O seams (stack reading, float TIFF
//! export, smoothing) around them.

mod reader;
mod lsm_reader;
mod writer;
mod standard_tiff_writer;
pub mod filter;
pub mod roi;
pub mod types;

pub use reader::StackReader;
pub use lsm_reader::LsmReader;
pub use writer::TiffWriter;
pub use standard_tiff_writer::StandardTiffWriter;
pub use filter::{ChannelFilter, GaussianBlur};
pub use roi::Roi;
pub use types::ChannelImage;
