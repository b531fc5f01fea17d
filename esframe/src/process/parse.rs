use log::debug;

use crate::process::sync;
use crate::structs::codec::{Codec, FrameInfo, PcmFormat};
use crate::structs::timestamp::TimestampQueue;
use crate::utils::decode_buffer::{DecodeBuffer, PAD};

/// Sample frames handed out per PCM "frame" in raw PCM mode.
pub const PCM_CHUNK_SAMPLES: usize = 1024;

/// Counters describing what the parser dropped while resynchronizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Bytes dropped in front of frames.
    pub bytes_skipped: u64,
    /// Scans that had to drop at least one byte.
    pub resyncs: u64,
    pub resets: u64,
}

/// Parses a buffered elementary stream into frames.
///
/// Owns the decode buffer and the timestamp queue and keeps them in step:
/// every append pushes one timestamp segment, every shrink consumes the same
/// byte count from both. The frame at the head of the buffer is recomputed
/// lazily, only when it is queried after the content changed.
///
/// # Example
///
/// ```rust
/// use esframe::process::parse::Parser;
/// use esframe::process::{EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE, example_frame};
/// use esframe::structs::codec::Codec;
///
/// let mut parser = Parser::default();
/// let frame = example_frame(&EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE);
/// assert!(parser.append(&frame, Some(1000)));
///
/// let info = parser.current_frame();
/// assert_eq!(info.codec, Codec::Ac3);
/// assert_eq!(parser.front_timestamp(), Some(1000));
///
/// parser.shrink(info.frame_size);
/// assert!(parser.is_empty());
/// ```
#[derive(Debug)]
pub struct Parser {
    buffer: DecodeBuffer,
    timestamps: TimestampQueue,
    dirty: bool,
    frame: FrameInfo,
    pcm_format: Option<PcmFormat>,
    stats: ParserStats,
}

impl Default for Parser {
    fn default() -> Self {
        Self::from_buffer(DecodeBuffer::default())
    }
}

impl Parser {
    /// Creates a parser whose buffer holds `capacity` bytes including padding.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_buffer(DecodeBuffer::with_capacity(capacity))
    }

    fn from_buffer(buffer: DecodeBuffer) -> Self {
        Self {
            buffer,
            timestamps: TimestampQueue::default(),
            dirty: false,
            frame: FrameInfo::INVALID,
            pcm_format: None,
            stats: ParserStats::default(),
        }
    }

    /// Appends stream bytes tagged with the timestamp of their first byte.
    ///
    /// Returns `false` without buffering anything when the bytes do not fit;
    /// producers poll [`free_space`](Self::free_space) to avoid that.
    pub fn append(&mut self, bytes: &[u8], timestamp: Option<i64>) -> bool {
        if bytes.is_empty() {
            return true;
        }

        if !self.buffer.append(bytes) {
            return false;
        }

        self.timestamps.push_segment(timestamp, bytes.len());
        self.dirty = true;

        true
    }

    /// Consumes `n` bytes from the head of the buffer.
    pub fn shrink(&mut self, n: usize) {
        if n == 0 {
            return;
        }

        self.drop_front(n);
        self.dirty = true;
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
        self.timestamps.clear();
        self.frame = FrameInfo::INVALID;
        self.dirty = false;
        self.stats.resets += 1;
    }

    /// Returns the frame at the head of the buffer, rescanning if needed.
    ///
    /// Garbage in front of the first frame is dropped by the scan.
    pub fn current_frame(&mut self) -> FrameInfo {
        if self.dirty {
            self.frame = match self.pcm_format {
                Some(format) => self.pcm_frame(format),
                None => self.sync(),
            };
            self.dirty = false;
        }

        self.frame
    }

    /// Bytes of the current frame, empty while no complete frame is buffered.
    pub fn frame_data(&mut self) -> &[u8] {
        let size = self.current_frame().frame_size;
        &self.buffer.data()[..size]
    }

    /// True while no complete frame is buffered.
    pub fn is_empty(&mut self) -> bool {
        self.current_frame().frame_size == 0
    }

    pub fn free_space(&self) -> usize {
        self.buffer.free_space()
    }

    /// Timestamp attributed to the next frame.
    pub fn front_timestamp(&self) -> Option<i64> {
        self.timestamps.front_timestamp()
    }

    /// Buffered bytes, complete frame or not.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Switches between sync word autodetection (`None`) and headerless PCM.
    pub fn set_pcm_format(&mut self, format: Option<PcmFormat>) {
        if self.pcm_format != format {
            self.pcm_format = format;
            self.dirty = true;
        }
    }

    pub fn pcm_format(&self) -> Option<PcmFormat> {
        self.pcm_format
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Byte count tracked by the timestamp queue; always equals [`len`](Self::len).
    pub fn segment_bytes(&self) -> usize {
        self.timestamps.total_length()
    }

    fn drop_front(&mut self, n: usize) {
        self.buffer.shrink(n);
        self.timestamps.consume(n);
    }

    fn sync(&mut self) -> FrameInfo {
        let max_frame_size = self.buffer.capacity() - PAD;
        let result = sync::scan(&self.buffer, max_frame_size);

        if result.skipped > 0 {
            debug!(
                "Skipped {} bytes to resync ({} found)",
                result.skipped, result.info.codec
            );
            self.stats.bytes_skipped += result.skipped as u64;
            self.stats.resyncs += 1;
            self.drop_front(result.skipped);
        }

        result.info
    }

    fn pcm_frame(&self, format: PcmFormat) -> FrameInfo {
        let block_align = format.block_align();
        if block_align == 0 {
            return FrameInfo::INVALID;
        }

        let samples = (self.buffer.len() / block_align).min(PCM_CHUNK_SAMPLES);

        FrameInfo {
            codec: Codec::Pcm,
            channels: format.channels,
            sampling_rate: format.sampling_rate,
            frame_size: samples * block_align,
            samples: samples as u32,
        }
    }
}
