use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use esframed_macros::{ToBytes, riff_chunk};

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const DATA_ID: [u8; 4] = *b"data";

const WAVE_FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Offset of the RIFF size field.
const RIFF_SIZE_POSITION: u64 = 4;

pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_chunk<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        writer.write_all(self.chunk_id())?;
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(&data)
    }
}

#[riff_chunk(b"fmt ")]
#[derive(ToBytes)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

/// RIFF WAVE writer for 16-bit little-endian PCM
pub struct WAVWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    data_size_position: u64,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
}

impl<W: Write + Seek> WAVWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            data_size_position: 0,
            data_written: 0,
            sample_rate: 48000,
            channels: 2,
        }
    }

    pub fn configure_audio_format(&mut self, sample_rate: u32, channels: u16) -> io::Result<()> {
        if self.data_written > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot change format after writing data",
            ));
        }

        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    /// Writes the header with zero sizes, patched by [`finish`](Self::finish).
    pub fn write_header(&mut self) -> io::Result<()> {
        let block_align = self
            .channels
            .checked_mul(BITS_PER_SAMPLE / 8)
            .ok_or_else(|| invalid_format("Too many channels"))?;
        let byte_rate = self
            .sample_rate
            .checked_mul(block_align as u32)
            .ok_or_else(|| invalid_format("Byte rate exceeds 32 bits"))?;

        let fmt = FmtChunk {
            format_tag: WAVE_FORMAT_PCM,
            channels: self.channels,
            sample_rate: self.sample_rate,
            byte_rate,
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
        };

        self.writer.write_all(&RIFF_ID)?;
        self.writer.write_all(&0u32.to_le_bytes())?;
        self.writer.write_all(&WAVE_ID)?;

        fmt.write_chunk(&mut self.writer)?;

        self.writer.write_all(&DATA_ID)?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?;

        Ok(())
    }

    /// Appends interleaved 16-bit little-endian samples.
    pub fn write_pcm_16bit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and patches the RIFF and data chunk sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        let current_pos = self.writer.stream_position()?;
        let too_large = || io::Error::new(io::ErrorKind::InvalidData, "WAV data exceeds 4 GiB");
        let data_size = u32::try_from(self.data_written).map_err(|_| too_large())?;
        let riff_size = u32::try_from(current_pos - 8).map_err(|_| too_large())?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(RIFF_SIZE_POSITION))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(current_pos))?;
        self.writer.flush()?;

        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

fn invalid_format(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}
