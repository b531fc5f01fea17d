//! Utility functions and supporting infrastructure.
//!
//! Provides the padded decode buffer, bitstream I/O for header parsing,
//! output slot pooling and error types.

pub mod bitstream_io;
pub mod buffer_pool;
pub mod decode_buffer;
pub mod errors;
