//! Audio pipeline: source reader, broadcast buffer and spectral analysis

pub mod analyzer;
pub mod buffer;
pub mod format;
pub mod reader;
pub mod source;
