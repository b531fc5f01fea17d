use std::io::{BufWriter, Seek, Write};

use anyhow::{Result, anyhow, bail};

use crate::cli::command::OutputFormat;
use crate::wav::WAVWriter;
use esframe::process::drive::{OutputBuffer, OutputSetup, OutputSink};
use esframe::utils::buffer_pool::BufferPool;

pub enum AudioWriter<W: Write + Seek> {
    Raw(BufWriter<W>),
    Wav(WAVWriter<W>),
}

impl<W: Write + Seek> AudioWriter<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            AudioWriter::Raw(writer) => writer.write_all(data)?,
            AudioWriter::Wav(writer) => writer.write_pcm_16bit(data)?,
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            AudioWriter::Raw(writer) => writer.flush()?,
            AudioWriter::Wav(writer) => writer.finish()?,
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> Result<W> {
        Ok(match self {
            AudioWriter::Raw(writer) => writer.into_inner().map_err(|e| e.into_error())?,
            AudioWriter::Wav(writer) => writer.into_inner()?,
        })
    }
}

/// Writes emitted frames to one output, raw or as WAV.
///
/// The writer is opened on the first setup. WAV output takes PCM only and
/// cannot change its format after the header is written.
pub struct FileSink<W: Write + Seek> {
    target: Option<W>,
    writer: Option<AudioWriter<W>>,
    format: OutputFormat,
    expand_5_1: bool,
    wav_format: Option<(u32, u16)>,
    pool: BufferPool,
}

impl<W: Write + Seek> FileSink<W> {
    pub fn new(target: W, format: OutputFormat, expand_5_1: bool) -> Self {
        Self {
            target: Some(target),
            writer: None,
            format,
            expand_5_1,
            wav_format: None,
            pool: BufferPool::default(),
        }
    }

    /// Returns the underlying output, flushing buffered data.
    #[cfg(test)]
    pub fn into_inner(self) -> Result<W> {
        match (self.writer, self.target) {
            (Some(writer), _) => writer.into_inner(),
            (None, Some(target)) => Ok(target),
            (None, None) => Err(anyhow!("Output already taken")),
        }
    }

    fn open_writer(&mut self, sampling_rate: u32, channels: u16) -> Result<()> {
        let target = self
            .target
            .take()
            .ok_or_else(|| anyhow!("Output already taken"))?;

        self.writer = Some(match self.format {
            OutputFormat::Raw => AudioWriter::Raw(BufWriter::new(target)),
            OutputFormat::Wav => {
                let mut writer = WAVWriter::new(target);
                writer.configure_audio_format(sampling_rate, channels)?;
                writer.write_header()?;
                self.wav_format = Some((sampling_rate, channels));
                AudioWriter::Wav(writer)
            }
        });

        Ok(())
    }
}

impl<W: Write + Seek + Send> OutputSink for FileSink<W> {
    fn configure(&mut self, setup: &OutputSetup) -> Result<u16> {
        let channels = if self.expand_5_1 && !setup.passthrough && setup.channels == 6 {
            8
        } else {
            setup.channels
        };

        if self.format == OutputFormat::Wav {
            if setup.passthrough {
                bail!("WAV output needs PCM, got {} frames", setup.codec);
            }
            if let Some((rate, ch)) = self.wav_format {
                if (rate, ch) != (setup.sampling_rate, channels) {
                    bail!("WAV output is {ch} ch @ {rate} Hz, cannot switch to {setup}");
                }
            }
        }

        if self.writer.is_none() {
            self.open_writer(setup.sampling_rate, channels)?;
        }

        Ok(channels)
    }

    fn max_buffer_size(&self) -> usize {
        self.pool.max_slot_size()
    }

    fn request_buffer(
        &mut self,
        size: usize,
        timestamp: Option<i64>,
    ) -> Result<Option<OutputBuffer>> {
        Ok(self
            .pool
            .try_acquire(size)
            .map(|data| OutputBuffer { data, timestamp }))
    }

    fn submit(&mut self, buffer: OutputBuffer) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Output not configured"))?;
        let result = writer.write(&buffer.data);
        self.pool.release(buffer.data);

        result
    }

    fn flush(&mut self) {
        log::debug!("Output reset, {} slots in use", self.pool.in_use());
    }

    fn finish(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.finish(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esframe::structs::codec::Codec;
    use std::io::Cursor;

    const PCM_5_1: OutputSetup = OutputSetup {
        codec: Codec::Pcm,
        channels: 6,
        sampling_rate: 48000,
        passthrough: false,
    };

    fn emit(sink: &mut FileSink<Cursor<Vec<u8>>>, data: &[u8]) -> Result<()> {
        let mut buffer = sink
            .request_buffer(data.len(), None)?
            .ok_or_else(|| anyhow!("no buffer"))?;
        buffer.data.extend_from_slice(data);
        sink.submit(buffer)
    }

    #[test]
    fn raw_passthrough_writes_frames_back_to_back() -> Result<()> {
        let mut sink = FileSink::new(Cursor::new(Vec::new()), OutputFormat::Raw, true);
        let setup = OutputSetup {
            codec: Codec::Ac3,
            channels: 6,
            sampling_rate: 48000,
            passthrough: true,
        };

        // Compressed frames are never widened
        assert_eq!(sink.configure(&setup)?, 6);
        emit(&mut sink, &[1, 2, 3])?;
        emit(&mut sink, &[4, 5])?;
        sink.finish()?;

        assert_eq!(sink.into_inner()?.into_inner(), [1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn wav_takes_widened_pcm() -> Result<()> {
        let mut sink = FileSink::new(Cursor::new(Vec::new()), OutputFormat::Wav, true);
        assert_eq!(sink.configure(&PCM_5_1)?, 8);

        emit(&mut sink, &[0u8; 32])?;
        // A reset reconfigures with the same setup
        assert_eq!(sink.configure(&PCM_5_1)?, 8);
        sink.finish()?;

        let bytes = sink.into_inner()?.into_inner();
        assert_eq!(bytes.len(), 44 + 32);
        assert_eq!(&bytes[22..24], &8u16.to_le_bytes());
        assert_eq!(&bytes[40..44], &32u32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn wav_rejects_passthrough_and_format_switch() -> Result<()> {
        let mut sink = FileSink::new(Cursor::new(Vec::new()), OutputFormat::Wav, false);
        let ac3 = OutputSetup {
            codec: Codec::Ac3,
            passthrough: true,
            ..PCM_5_1
        };
        assert!(sink.configure(&ac3).is_err());

        assert_eq!(sink.configure(&PCM_5_1)?, 6);
        let stereo = OutputSetup {
            channels: 2,
            ..PCM_5_1
        };
        assert!(sink.configure(&stereo).is_err());
        Ok(())
    }
}
