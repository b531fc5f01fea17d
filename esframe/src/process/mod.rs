/// Frame synchronization.
///
/// Fast sync-word checks, full header checks and the byte-walking
/// resynchronization [`scan`](sync::scan).
pub mod sync;

/// Buffered stream parsing.
///
/// Provides the [`Parser`](parse::Parser) that keeps the decode buffer and the
/// timestamp queue consistent and reports the current frame.
pub mod parse;

/// Producer/consumer sharing of one parser.
///
/// Provides [`SharedParser`](shared::SharedParser), the mutex and condition
/// variable pair producers append through and the drive loop waits on.
pub mod shared;

/// Frame consumption.
///
/// Provides the [`DriveLoop`](drive::DriveLoop) worker plus the
/// [`FrameDecoder`](drive::FrameDecoder) and [`OutputSink`](drive::OutputSink)
/// collaborator traits.
pub mod drive;

/// AC-3, 48 kHz, frmsizecod 0 (32 kbit/s, 128-byte frames), 2/0 stereo.
pub const EXAMPLE_AC3_HEADER: [u8; 7] = [0x0B, 0x77, 0x00, 0x00, 0x00, 0x40, 0x40];
pub const EXAMPLE_AC3_FRAME_SIZE: usize = 128;

/// E-AC-3 independent substream, 48 kHz, 6 blocks, 3/2 + LFE, 256-byte frames.
pub const EXAMPLE_EAC3_HEADER: [u8; 6] = [0x0B, 0x77, 0x00, 0x7F, 0x3F, 0x80];
pub const EXAMPLE_EAC3_FRAME_SIZE: usize = 256;

/// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, joint stereo, 417-byte frames.
pub const EXAMPLE_MPEG_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];
pub const EXAMPLE_MPEG_FRAME_SIZE: usize = 417;

/// ADTS AAC-LC, 48 kHz, stereo, no CRC, 200-byte frames.
pub const EXAMPLE_ADTS_HEADER: [u8; 7] = [0xFF, 0xF1, 0x4C, 0x80, 0x19, 0x1F, 0xFC];
pub const EXAMPLE_ADTS_FRAME_SIZE: usize = 200;

/// Builds a frame of `size` bytes from `header` followed by zeroed payload.
pub fn example_frame(header: &[u8], size: usize) -> Vec<u8> {
    let mut frame = header.to_vec();
    frame.resize(size.max(header.len()), 0);
    frame
}
