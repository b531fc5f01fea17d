//! AC-3 and E-AC-3 sync frame headers.
//!
//! Both formats start with the 16-bit sync word `0x0B77` and carry the
//! 5-bit bitstream id (`bsid`) at the same position (byte 5, upper bits).
//! `bsid <= 10` is AC-3 (ATSC A/52 Annex A excluded), `11..=16` is E-AC-3.

use anyhow::{Result, bail};

use crate::structs::codec::{Codec, FrameInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

pub const SYNC_WORD: u16 = 0x0B77;

/// Bytes needed to reach `lfeon` in the worst case (`acmod` with all
/// optional mix levels present).
pub const AC3_HEADER_LEN: usize = 7;

pub const EAC3_HEADER_LEN: usize = 6;

/// Byte holding `bsid` in its upper five bits.
pub const BSID_OFFSET: usize = 5;

pub const MAX_AC3_BSID: u8 = 10;

/// Highest bsid at the nominal rate; 9 and 10 halve and quarter it.
const FULL_RATE_BSID: u8 = 8;
pub const MAX_EAC3_BSID: u8 = 16;

pub const AC3_SAMPLES: u32 = 1536;

const SAMPLING_RATE: [u32; 3] = [48000, 44100, 32000];

/// E-AC-3 reduced sampling rates selected by `fscod2` when `fscod == 3`.
const REDUCED_SAMPLING_RATE: [u32; 3] = [24000, 22050, 16000];

/// Full-bandwidth channels per audio coding mode.
const ACMOD_CHANNELS: [u16; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

const EAC3_BLOCKS: [u32; 4] = [1, 2, 3, 6];

/// AC-3 frame size in 16-bit words, indexed by `[frmsizecod][fscod]`.
const FRAME_SIZE_WORDS: [[u16; 3]; 38] = [
    [64, 69, 96],
    [64, 70, 96],
    [80, 87, 120],
    [80, 88, 120],
    [96, 104, 144],
    [96, 105, 144],
    [112, 121, 168],
    [112, 122, 168],
    [128, 139, 192],
    [128, 140, 192],
    [160, 174, 240],
    [160, 175, 240],
    [192, 208, 288],
    [192, 209, 288],
    [224, 243, 336],
    [224, 244, 336],
    [256, 278, 384],
    [256, 279, 384],
    [320, 348, 480],
    [320, 349, 480],
    [384, 417, 576],
    [384, 418, 576],
    [448, 487, 672],
    [448, 488, 672],
    [512, 557, 768],
    [512, 558, 768],
    [640, 696, 960],
    [640, 697, 960],
    [768, 835, 1152],
    [768, 836, 1152],
    [896, 975, 1344],
    [896, 976, 1344],
    [1024, 1114, 1536],
    [1024, 1115, 1536],
    [1152, 1253, 1728],
    [1152, 1254, 1728],
    [1280, 1393, 1920],
    [1280, 1394, 1920],
];

#[inline(always)]
pub fn fast_check(p: &[u8]) -> bool {
    let [b0, b1, ..] = *p else {
        return false;
    };

    u16::from_be_bytes([b0, b1]) == SYNC_WORD
}

/// Reads `bsid` without parsing the rest of the header.
pub fn bsid(p: &[u8]) -> Option<u8> {
    p.get(BSID_OFFSET).map(|b| b >> 3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Header {
    pub fscod: u8,
    pub frmsizecod: u8,
    pub bsid: u8,
    pub bsmod: u8,
    pub acmod: u8,
    pub lfeon: bool,
}

impl Ac3Header {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        // syncword, crc1
        reader.skip_n(32)?;

        let fscod = reader.get_n::<u8>(2)?;
        if fscod == 3 {
            bail!(HeaderError::Ac3ReservedSampleRate(fscod));
        }

        let frmsizecod = reader.get_n::<u8>(6)?;
        if frmsizecod as usize >= FRAME_SIZE_WORDS.len() {
            bail!(HeaderError::Ac3InvalidFrameSizeCode(frmsizecod));
        }

        let bsid = reader.get_n::<u8>(5)?;
        if bsid > MAX_AC3_BSID {
            bail!(HeaderError::UnsupportedBsid(bsid));
        }

        let bsmod = reader.get_n(3)?;
        let acmod = reader.get_n::<u8>(3)?;

        // cmixlev, surmixlev, dsurmod
        if acmod & 1 != 0 && acmod != 1 {
            reader.skip_n(2)?;
        }
        if acmod & 4 != 0 {
            reader.skip_n(2)?;
        }
        if acmod == 2 {
            reader.skip_n(2)?;
        }

        let lfeon = reader.get()?;

        Ok(Self {
            fscod,
            frmsizecod,
            bsid,
            bsmod,
            acmod,
            lfeon,
        })
    }

    pub fn sampling_rate(&self) -> u32 {
        SAMPLING_RATE[self.fscod as usize] >> self.bsid.saturating_sub(FULL_RATE_BSID)
    }

    pub fn frame_size(&self) -> usize {
        FRAME_SIZE_WORDS[self.frmsizecod as usize][self.fscod as usize] as usize * 2
    }

    pub fn channels(&self) -> u16 {
        ACMOD_CHANNELS[self.acmod as usize] + self.lfeon as u16
    }

    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            codec: Codec::Ac3,
            channels: self.channels(),
            sampling_rate: self.sampling_rate(),
            frame_size: self.frame_size(),
            samples: AC3_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eac3Header {
    pub strmtyp: u8,
    pub substreamid: u8,
    pub frmsiz: u16,
    pub fscod: u8,
    pub fscod2: Option<u8>,
    pub numblkscod: u8,
    pub acmod: u8,
    pub lfeon: bool,
    pub bsid: u8,
}

impl Eac3Header {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        reader.skip_n(16)?;

        let strmtyp = reader.get_n::<u8>(2)?;
        if strmtyp == 3 {
            bail!(HeaderError::Eac3ReservedStreamType(strmtyp));
        }

        let substreamid = reader.get_n(3)?;
        let frmsiz = reader.get_n(11)?;

        let fscod = reader.get_n::<u8>(2)?;
        let (fscod2, numblkscod) = if fscod == 3 {
            let fscod2 = reader.get_n::<u8>(2)?;
            if fscod2 == 3 {
                bail!(HeaderError::Eac3ReservedSampleRate(fscod2));
            }
            (Some(fscod2), 3)
        } else {
            (None, reader.get_n(2)?)
        };

        let acmod = reader.get_n(3)?;
        let lfeon = reader.get()?;

        let bsid = reader.get_n::<u8>(5)?;
        if !(MAX_AC3_BSID + 1..=MAX_EAC3_BSID).contains(&bsid) {
            bail!(HeaderError::UnsupportedBsid(bsid));
        }

        Ok(Self {
            strmtyp,
            substreamid,
            frmsiz,
            fscod,
            fscod2,
            numblkscod,
            acmod,
            lfeon,
            bsid,
        })
    }

    pub fn sampling_rate(&self) -> u32 {
        match self.fscod2 {
            Some(fscod2) => REDUCED_SAMPLING_RATE[fscod2 as usize],
            None => SAMPLING_RATE[self.fscod as usize],
        }
    }

    pub fn frame_size(&self) -> usize {
        (self.frmsiz as usize + 1) * 2
    }

    pub fn samples(&self) -> u32 {
        256 * EAC3_BLOCKS[self.numblkscod as usize]
    }

    pub fn channels(&self) -> u16 {
        ACMOD_CHANNELS[self.acmod as usize] + self.lfeon as u16
    }

    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            codec: Codec::Eac3,
            channels: self.channels(),
            sampling_rate: self.sampling_rate(),
            frame_size: self.frame_size(),
            samples: self.samples(),
        }
    }
}
