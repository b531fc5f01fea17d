//! MPEG-1/2/2.5 audio frame headers (Layer I, II and III).
//!
//! ## Header Layout
//!
//! 32 bits: 11-bit sync (all ones), version (2), layer (2), protection (1),
//! bitrate index (4), sampling rate index (2), padding (1), private (1),
//! channel mode (2), followed by fields the framer does not need.
//!
//! Free-format streams (bitrate index 0) carry no frame length and are
//! rejected.

use anyhow::{Result, bail};

use crate::structs::codec::{Codec, FrameInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 4;

/// Bitrates in kbit/s, indexed by `[lsf][layer - 1][bitrate_index]`.
const BITRATE_KBPS: [[[u16; 15]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ],
];

/// MPEG-1 sampling rates; MPEG-2 halves and MPEG-2.5 quarters them.
const SAMPLING_RATE: [u32; 3] = [44100, 48000, 32000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    /// Low sampling frequency extension (MPEG-2 and MPEG-2.5).
    fn lsf(&self) -> bool {
        !matches!(self, MpegVersion::Mpeg1)
    }

    fn rate_shift(&self) -> u32 {
        match self {
            MpegVersion::Mpeg1 => 0,
            MpegVersion::Mpeg2 => 1,
            MpegVersion::Mpeg25 => 2,
        }
    }
}

/// Cheap sync test on the first three bytes.
///
/// Rejects reserved version/layer codes, the "bad" bitrate index and the
/// reserved sampling rate index, so most random `0xFF` bytes fail here.
#[inline(always)]
pub fn fast_check(p: &[u8]) -> bool {
    let [b0, b1, b2, ..] = *p else {
        return false;
    };

    b0 == 0xFF
        && b1 & 0xE0 == 0xE0
        && b1 & 0x18 != 0x08
        && b1 & 0x06 != 0
        && b2 & 0xF0 != 0xF0
        && b2 & 0x0C != 0x0C
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegHeader {
    pub version: MpegVersion,
    pub layer: u8,
    pub protection_absent: bool,
    pub bitrate_index: u8,
    pub sampling_rate_index: u8,
    pub padding: bool,
    pub channel_mode: u8,
}

impl MpegHeader {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        reader.skip_n(11)?;

        let version = match reader.get_n::<u8>(2)? {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            value => bail!(HeaderError::MpegReserved {
                field: "version",
                value
            }),
        };

        let layer = match reader.get_n::<u8>(2)? {
            0 => bail!(HeaderError::MpegReserved {
                field: "layer",
                value: 0
            }),
            code => 4 - code,
        };

        let protection_absent = reader.get()?;

        let bitrate_index = match reader.get_n::<u8>(4)? {
            0 => bail!(HeaderError::MpegFreeFormat),
            15 => bail!(HeaderError::MpegReserved {
                field: "bitrate_index",
                value: 15
            }),
            index => index,
        };

        let sampling_rate_index = match reader.get_n::<u8>(2)? {
            3 => bail!(HeaderError::MpegReserved {
                field: "sampling_rate_index",
                value: 3
            }),
            index => index,
        };

        let padding = reader.get()?;
        reader.skip_n(1)?;
        let channel_mode = reader.get_n(2)?;

        Ok(Self {
            version,
            layer,
            protection_absent,
            bitrate_index,
            sampling_rate_index,
            padding,
            channel_mode,
        })
    }

    pub fn sampling_rate(&self) -> u32 {
        SAMPLING_RATE[self.sampling_rate_index as usize] >> self.version.rate_shift()
    }

    /// Bitrate in bit/s.
    pub fn bitrate(&self) -> u32 {
        let lsf = self.version.lsf() as usize;
        BITRATE_KBPS[lsf][self.layer as usize - 1][self.bitrate_index as usize] as u32 * 1000
    }

    pub fn frame_size(&self) -> usize {
        let bitrate = self.bitrate() as usize;
        let rate = self.sampling_rate() as usize;
        let padding = self.padding as usize;

        match self.layer {
            1 => (12 * bitrate / rate + padding) * 4,
            2 => 144 * bitrate / rate + padding,
            _ if self.version.lsf() => 72 * bitrate / rate + padding,
            _ => 144 * bitrate / rate + padding,
        }
    }

    pub fn samples(&self) -> u32 {
        match self.layer {
            1 => 384,
            2 => 1152,
            _ if self.version.lsf() => 576,
            _ => 1152,
        }
    }

    /// Mode 3 is single channel, every other mode carries two.
    pub fn channels(&self) -> u16 {
        if self.channel_mode == 3 { 1 } else { 2 }
    }

    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            codec: Codec::Mpeg,
            channels: self.channels(),
            sampling_rate: self.sampling_rate(),
            frame_size: self.frame_size(),
            samples: self.samples(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Result<MpegHeader> {
        MpegHeader::read(&mut BsIoSliceReader::from_slice(bytes))
    }

    #[test]
    fn mpeg1_layer3_128k() -> Result<()> {
        let header = parse(&[0xFF, 0xFB, 0x90, 0x64])?;
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.layer, 3);
        assert_eq!(header.bitrate(), 128_000);
        assert_eq!(header.sampling_rate(), 44100);
        assert_eq!(header.frame_size(), 417);
        assert_eq!(header.channels(), 2);
        assert_eq!(header.samples(), 1152);

        let padded = parse(&[0xFF, 0xFB, 0x92, 0x64])?;
        assert_eq!(padded.frame_size(), 418);
        Ok(())
    }

    #[test]
    fn mpeg1_layer2_mono() -> Result<()> {
        let header = parse(&[0xFF, 0xFD, 0xC4, 0xC0])?;
        assert_eq!(header.layer, 2);
        assert_eq!(header.sampling_rate(), 48000);
        assert_eq!(header.frame_size(), 768);
        assert_eq!(header.channels(), 1);
        Ok(())
    }

    #[test]
    fn mpeg1_layer1() -> Result<()> {
        // 32 kbit/s at 48 kHz: 12 * 32000 / 48000 = 8 slots of 4 bytes.
        let header = parse(&[0xFF, 0xFF, 0x14, 0x00])?;
        assert_eq!(header.layer, 1);
        assert_eq!(header.frame_size(), 32);
        assert_eq!(header.samples(), 384);
        Ok(())
    }

    #[test]
    fn mpeg2_layer3_uses_half_size() -> Result<()> {
        // MPEG-2, 64 kbit/s, 24 kHz: 72 * 64000 / 24000 = 192.
        let header = parse(&[0xFF, 0xF3, 0x84, 0xC0])?;
        assert_eq!(header.version, MpegVersion::Mpeg2);
        assert_eq!(header.sampling_rate(), 24000);
        assert_eq!(header.frame_size(), 192);
        assert_eq!(header.samples(), 576);
        Ok(())
    }

    #[test]
    fn rejects_reserved_fields() {
        assert!(fast_check(&[0xFF, 0xFB, 0x90]));
        assert!(!fast_check(&[0xFF, 0xEB, 0x90])); // reserved version
        assert!(!fast_check(&[0xFF, 0xF9, 0x90])); // reserved layer
        assert!(!fast_check(&[0xFF, 0xFB, 0xF0])); // bad bitrate
        assert!(!fast_check(&[0xFF, 0xFB, 0x9C])); // reserved rate
        assert!(!fast_check(&[0xFF, 0xFB]));

        let err = parse(&[0xFF, 0xFB, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HeaderError>(),
            Some(&HeaderError::MpegFreeFormat)
        );
    }
}
