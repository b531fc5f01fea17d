//! ADTS (Audio Data Transport Stream) headers for AAC.

use anyhow::{Result, bail};

use crate::structs::codec::{Codec, FrameInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

pub const HEADER_LEN: usize = 7;
pub const HEADER_LEN_WITH_CRC: usize = 9;

pub const SAMPLES_PER_RAW_BLOCK: u32 = 1024;

const SAMPLING_RATE: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 12-bit sync, layer `00` and a non-reserved sampling frequency index.
#[inline(always)]
pub fn fast_check(p: &[u8]) -> bool {
    let [b0, b1, b2, ..] = *p else {
        return false;
    };

    b0 == 0xFF && b1 & 0xF6 == 0xF0 && ((b2 >> 2) & 0x0F) < SAMPLING_RATE.len() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub mpeg2: bool,
    pub protection_absent: bool,
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    pub frame_length: u16,
    pub buffer_fullness: u16,
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        reader.skip_n(12)?;
        let mpeg2 = reader.get()?;
        // layer
        reader.skip_n(2)?;
        let protection_absent = reader.get()?;
        let profile = reader.get_n(2)?;

        let sampling_frequency_index = reader.get_n::<u8>(4)?;
        if sampling_frequency_index as usize >= SAMPLING_RATE.len() {
            bail!(HeaderError::AdtsReservedSampleRate(sampling_frequency_index));
        }

        // private_bit
        reader.skip_n(1)?;
        let channel_configuration = reader.get_n(3)?;
        // original_copy, home, copyright_identification_bit/start
        reader.skip_n(4)?;

        let frame_length = reader.get_n::<u16>(13)?;
        let buffer_fullness = reader.get_n(11)?;
        let raw_data_blocks = reader.get_n(2)?;

        let header = Self {
            mpeg2,
            protection_absent,
            profile,
            sampling_frequency_index,
            channel_configuration,
            frame_length,
            buffer_fullness,
            raw_data_blocks,
        };

        if (frame_length as usize) < header.header_len() {
            bail!(HeaderError::AdtsFrameTooShort {
                length: frame_length as usize,
                header: header.header_len(),
            });
        }

        Ok(header)
    }

    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            HEADER_LEN
        } else {
            HEADER_LEN_WITH_CRC
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        SAMPLING_RATE[self.sampling_frequency_index as usize]
    }

    /// Configuration 0 defers the layout to an in-band program config
    /// element; it is reported as stereo and left for the decoder to refine.
    pub fn channels(&self) -> u16 {
        match self.channel_configuration {
            0 => 2,
            7 => 8,
            config => config as u16,
        }
    }

    pub fn samples(&self) -> u32 {
        SAMPLES_PER_RAW_BLOCK * (self.raw_data_blocks as u32 + 1)
    }

    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            codec: Codec::Aac,
            channels: self.channels(),
            sampling_rate: self.sampling_rate(),
            frame_size: self.frame_length as usize,
            samples: self.samples(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aac_lc_stereo_48k() -> Result<()> {
        let bytes = [0xFF, 0xF1, 0x4C, 0x80, 0x19, 0x1F, 0xFC];
        assert!(fast_check(&bytes));

        let header = AdtsHeader::read(&mut BsIoSliceReader::from_slice(&bytes))?;
        assert_eq!(header.profile, 1);
        assert_eq!(header.frame_length, 200);
        assert_eq!(header.buffer_fullness, 0x7FF);
        assert_eq!(header.header_len(), HEADER_LEN);

        let info = header.frame_info();
        assert_eq!(info.codec, Codec::Aac);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sampling_rate, 48000);
        assert_eq!(info.samples, 1024);
        Ok(())
    }

    #[test]
    fn rejects_reserved_and_short() {
        // sampling_frequency_index 13
        assert!(!fast_check(&[0xFF, 0xF1, 0x74]));
        // layer bits set: that is an MPEG audio header
        assert!(!fast_check(&[0xFF, 0xFB, 0x4C]));

        // frame_length 5 < 7
        let short = [0xFF, 0xF1, 0x4C, 0x80, 0x00, 0xBF, 0xFC];
        let err = AdtsHeader::read(&mut BsIoSliceReader::from_slice(&short)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HeaderError>(),
            Some(&HeaderError::AdtsFrameTooShort {
                length: 5,
                header: 7
            })
        );
    }
}
