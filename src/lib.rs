pub mod fret_pipeline;
pub mod logger;
