//! Data structures representing format components.
//!
//! Contains the codec tag and frame parameters reported to consumers, the
//! per-codec header parsers used by the synchronizer, and the timestamp
//! queue that mirrors buffered data.

pub mod ac3;
pub mod adts;
pub mod codec;
pub mod mpeg;
pub mod timestamp;
