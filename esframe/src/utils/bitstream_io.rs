//! Bit-level reader used by the full header checks.
//!
//! Wraps a big-endian `bitstream_io::BitReader` over a byte slice and keeps
//! track of the readable length so header parsers can tell "ran out of bytes"
//! apart from "read a reserved value".

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

#[test]
fn read_ac3_fields() -> anyhow::Result<()> {
    let mut reader = BsIoSliceReader::from_slice(&[0x0B, 0x77, 0x12, 0x34, 0x1C, 0x40]);

    assert_eq!(reader.get_n::<u16>(16)?, 0x0B77);
    reader.skip_n(16)?;
    assert_eq!(reader.get_n::<u8>(2)?, 0);
    assert_eq!(reader.get_n::<u8>(6)?, 0x1C);
    assert_eq!(reader.get_n::<u8>(5)?, 8);
    assert_eq!(reader.position()?, 45);
    assert_eq!(reader.available()?, 3);
    assert!(reader.get_n::<u8>(8).is_err());

    Ok(())
}
