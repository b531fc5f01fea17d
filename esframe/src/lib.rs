//! Framing of compressed audio elementary streams.
//!
//! Identifies and delimits frames of MPEG audio (Layer I/II/III), AC-3,
//! E-AC-3 and AAC in ADTS framing inside an arbitrary byte stream, and
//! drives them to an output pipeline either as they are (passthrough) or
//! through a decoder.
//!
//! ## Technical Overview
//!
//! Bytes arrive in chunks of any size, each tagged with the presentation
//! timestamp of its first byte. They are buffered in a fixed-capacity
//! decode buffer with a zeroed tail pad, so sync checks can always read a
//! few bytes past the end of the data.
//!
//! A frame is only reported when it is completely buffered. Candidate
//! headers are confirmed by the presence of another sync word right after
//! the claimed frame; garbage in front of the first frame is dropped and
//! the timestamps of dropped bytes are discarded with them.
//!
//! ## Quick Start
//!
//! ```rust
//! use esframe::process::parse::Parser;
//! use esframe::process::{EXAMPLE_MPEG_HEADER, EXAMPLE_MPEG_FRAME_SIZE, example_frame};
//! use esframe::structs::codec::Codec;
//!
//! let mut parser = Parser::default();
//!
//! // Garbage followed by two MPEG audio frames
//! let frame = example_frame(&EXAMPLE_MPEG_HEADER, EXAMPLE_MPEG_FRAME_SIZE);
//! parser.append(&[0x42; 9], None);
//! parser.append(&frame, Some(0));
//! parser.append(&frame, Some(2351));
//!
//! let mut timestamps = Vec::new();
//! while !parser.is_empty() {
//!     let info = parser.current_frame();
//!     assert_eq!(info.codec, Codec::Mpeg);
//!     timestamps.push(parser.front_timestamp());
//!     parser.shrink(info.frame_size);
//! }
//!
//! assert_eq!(timestamps, [Some(0), Some(2351)]);
//! ```
//!
//! For threaded use, wrap the parser in a
//! [`SharedParser`](process::shared::SharedParser) and consume it with a
//! [`DriveLoop`](process::drive::DriveLoop).

/// Processing of buffered elementary streams.
///
/// 1. **Synchronization** ([`process::sync`]): Sync word detection and
///    header confirmation.
///
/// 2. **Parsing** ([`process::parse`]): Buffering with timestamp tracking
///    and current frame reporting.
///
/// 3. **Sharing** ([`process::shared`]): Producer/consumer access to one
///    parser.
///
/// 4. **Driving** ([`process::drive`]): Decoding or passthrough of frames to
///    an output sink.
pub mod process;

/// Frame header formats and stream bookkeeping.
///
/// - **Codecs** ([`structs::codec`]): Codec tags and frame parameters
/// - **MPEG audio** ([`structs::mpeg`]): Layer I/II/III headers
/// - **AC-3 / E-AC-3** ([`structs::ac3`]): Sync frame headers
/// - **ADTS** ([`structs::adts`]): AAC transport headers
/// - **Timestamps** ([`structs::timestamp`]): Per-segment timestamp queue
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Decode Buffer** ([`utils::decode_buffer`]): Padded byte buffer
/// - **Buffer Pool** ([`utils::buffer_pool`]): Bounded output slots
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
