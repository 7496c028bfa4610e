//! Common utilities module
//!
//! This module contains shared utilities used across the FRET pipeline.

pub mod error;
pub mod stats;

pub use error::{FretError, Result};
