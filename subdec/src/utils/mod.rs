//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, error handling and colour conversion for the
//! decoders.

pub mod bitstream_io;
pub mod errors;
pub mod yuv;
