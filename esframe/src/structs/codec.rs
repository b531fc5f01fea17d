//! Codec identification and per-frame stream parameters.

use std::fmt::Display;

/// Audio codec carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codec {
    /// No recognizable frame start.
    #[default]
    Invalid,
    /// Headerless 16-bit little-endian interleaved PCM.
    Pcm,
    /// MPEG-1/2/2.5 audio, Layer I, II or III.
    Mpeg,
    Ac3,
    Eac3,
    /// AAC in ADTS framing.
    Aac,
}

impl Codec {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Codec::Invalid)
    }

    /// Whether frames of this codec can be handed to an external receiver
    /// unmodified.
    pub fn supports_passthrough(&self) -> bool {
        matches!(self, Codec::Ac3 | Codec::Eac3 | Codec::Mpeg | Codec::Aac)
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Invalid => write!(f, "invalid"),
            Codec::Pcm => write!(f, "PCM"),
            Codec::Mpeg => write!(f, "MPEG"),
            Codec::Ac3 => write!(f, "AC-3"),
            Codec::Eac3 => write!(f, "E-AC-3"),
            Codec::Aac => write!(f, "AAC"),
        }
    }
}

/// Parameters of the frame at the head of the parser buffer.
///
/// `frame_size == 0` with a valid codec means the codec was identified but
/// the buffer does not yet hold the complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub codec: Codec,
    pub channels: u16,
    pub sampling_rate: u32,
    pub frame_size: usize,
    /// Samples per channel the frame decodes to.
    pub samples: u32,
}

impl FrameInfo {
    pub const INVALID: FrameInfo = FrameInfo {
        codec: Codec::Invalid,
        channels: 0,
        sampling_rate: 0,
        frame_size: 0,
        samples: 0,
    };

    pub fn is_complete(&self) -> bool {
        self.codec.is_valid() && self.frame_size > 0
    }

    /// Frame duration in seconds, if the sampling rate is known.
    pub fn duration(&self) -> Option<f64> {
        (self.sampling_rate > 0).then(|| self.samples as f64 / self.sampling_rate as f64)
    }
}

impl Display for FrameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ch @ {} Hz, {} bytes",
            self.codec, self.channels, self.sampling_rate, self.frame_size
        )
    }
}

/// Layout of a headerless PCM stream, declared out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sampling_rate: u32,
}

impl PcmFormat {
    /// Bytes per interleaved sample frame (16-bit samples).
    pub fn block_align(&self) -> usize {
        self.channels as usize * 2
    }
}

#[test]
fn codec_display() {
    assert_eq!(Codec::Eac3.to_string(), "E-AC-3");
    assert_eq!(Codec::default(), Codec::Invalid);
    assert!(!Codec::Pcm.supports_passthrough());

    let info = FrameInfo {
        codec: Codec::Ac3,
        channels: 6,
        sampling_rate: 48000,
        frame_size: 1792,
        samples: 1536,
    };
    assert_eq!(info.to_string(), "AC-3 6 ch @ 48000 Hz, 1792 bytes");
    assert_eq!(info.duration(), Some(0.032));
}
