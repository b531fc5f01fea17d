use anyhow::{Result, bail};
use log::trace;

use crate::structs::ac3::{self, Ac3Header, Eac3Header};
use crate::structs::adts::{self, AdtsHeader};
use crate::structs::codec::{Codec, FrameInfo};
use crate::structs::mpeg::{self, MpegHeader};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::decode_buffer::DecodeBuffer;
use crate::utils::errors::HeaderError;

/// Bytes a fast check looks at. The decode buffer pad guarantees they are
/// readable at every offset.
pub const FAST_CHECK_LEN: usize = 3;

/// Sync word families recognized by [`fast_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFamily {
    Mpeg,
    /// AC-3 and E-AC-3 share one sync word.
    Ac3,
    Adts,
}

/// Outcome of a full header check at one offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Header decoded; `frame_size` is the full frame length, which may
    /// exceed the bytes available.
    Header(FrameInfo),
    /// A sync word matched but the header is not fully buffered yet.
    Incomplete(Codec),
}

/// Result of a resynchronization scan over the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// Garbage bytes in front of the reported frame.
    pub skipped: usize,
    /// The frame found at `skipped`, with `frame_size == 0` when it is
    /// incomplete, or [`FrameInfo::INVALID`].
    pub info: FrameInfo,
}

#[inline(always)]
pub fn fast_check(p: &[u8]) -> Option<SyncFamily> {
    if mpeg::fast_check(p) {
        Some(SyncFamily::Mpeg)
    } else if ac3::fast_check(p) {
        Some(SyncFamily::Ac3)
    } else if adts::fast_check(p) {
        Some(SyncFamily::Adts)
    } else {
        None
    }
}

/// Runs the fast check and, if it passes, the full header check.
///
/// `p` must extend at least [`FAST_CHECK_LEN`] bytes past `available`
/// (zero padding); only the first `available` bytes are treated as data.
pub fn detect(p: &[u8], available: usize, max_frame_size: usize) -> Result<Option<Detection>> {
    let Some(family) = fast_check(p) else {
        return Ok(None);
    };

    let data = &p[..available.min(p.len())];

    let (codec, header_len) = match family {
        SyncFamily::Mpeg => (Codec::Mpeg, mpeg::HEADER_LEN),
        SyncFamily::Adts => (Codec::Aac, adts::HEADER_LEN),
        SyncFamily::Ac3 => match ac3::bsid(data) {
            None => return Ok(Some(Detection::Incomplete(Codec::Ac3))),
            Some(bsid) if bsid <= ac3::MAX_AC3_BSID => (Codec::Ac3, ac3::AC3_HEADER_LEN),
            Some(bsid) if bsid <= ac3::MAX_EAC3_BSID => (Codec::Eac3, ac3::EAC3_HEADER_LEN),
            Some(bsid) => bail!(HeaderError::UnsupportedBsid(bsid)),
        },
    };

    if data.len() < header_len {
        return Ok(Some(Detection::Incomplete(codec)));
    }

    let reader = &mut BsIoSliceReader::from_slice(data);
    let info = match codec {
        Codec::Mpeg => MpegHeader::read(reader)?.frame_info(),
        Codec::Ac3 => Ac3Header::read(reader)?.frame_info(),
        Codec::Eac3 => Eac3Header::read(reader)?.frame_info(),
        _ => AdtsHeader::read(reader)?.frame_info(),
    };

    if info.frame_size > max_frame_size {
        bail!(HeaderError::FrameExceedsCapacity {
            size: info.frame_size,
            capacity: max_frame_size,
        });
    }

    Ok(Some(Detection::Header(info)))
}

/// Locates the first frame in `buffer`, walking one byte at a time.
///
/// A decoded header is accepted when any sync word follows right after the
/// frame, or when too few bytes follow the frame to look (optimistic accept
/// near the end of the buffered data). The buffer is not modified; the caller
/// drops `skipped` bytes.
pub fn scan(buffer: &DecodeBuffer, max_frame_size: usize) -> ScanResult {
    let size = buffer.len();

    for offset in 0..size {
        let available = size - offset;
        let p = buffer.padded_from(offset);

        match detect(p, available, max_frame_size) {
            Ok(None) => {}
            Ok(Some(Detection::Incomplete(codec))) => {
                return ScanResult {
                    skipped: offset,
                    info: FrameInfo {
                        codec,
                        ..FrameInfo::INVALID
                    },
                };
            }
            Ok(Some(Detection::Header(info))) => {
                let next = info.frame_size;
                let confirmed =
                    available < next + FAST_CHECK_LEN || fast_check(&p[next..]).is_some();

                if confirmed {
                    let frame_size = if available < next { 0 } else { next };
                    return ScanResult {
                        skipped: offset,
                        info: FrameInfo { frame_size, ..info },
                    };
                }

                trace!("No sync after {} frame at offset {offset}", info.codec);
            }
            Err(e) => trace!("Rejected header at offset {offset}: {e}"),
        }
    }

    // The last byte may be the first half of a sync word.
    ScanResult {
        skipped: size.saturating_sub(1),
        info: FrameInfo::INVALID,
    }
}
