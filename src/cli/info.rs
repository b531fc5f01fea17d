use std::fmt::Display;
use std::path::Path;

use anyhow::{Result, anyhow, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;
use esframe::log_or_err;
use esframe::process::parse::Parser;
use esframe::structs::codec::{Codec, FrameInfo};

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing stream: {}", args.input.display());

    let mut context = AnalysisContext::new(cli.fail_level(), args.frames.is_some());

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing frames...");
        context.pb = Some(pb);
    }

    let mut input_reader = InputReader::new(&args.input)?;
    let mut parser = Parser::default();

    input_reader.process_chunks(READ_CHUNK_SIZE, |chunk| {
        context.feed(&mut parser, chunk)?;
        Ok(true)
    })?;

    context.finish(&parser)?;

    if context.segments.is_empty() {
        println!("No audio frame found in the input.");
        println!("This doesn't appear to be a supported elementary stream.");
        return Ok(());
    }

    display_stream_info(&context);
    display_summary(&context, &parser);

    if let Some(path) = &args.frames {
        write_frame_index(path, &args.input, &context)?;
    }

    Ok(())
}

/// Codec parameters whose change reconfigures an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamFormat {
    codec: Codec,
    channels: u16,
    sampling_rate: u32,
}

impl From<&FrameInfo> for StreamFormat {
    fn from(info: &FrameInfo) -> Self {
        Self {
            codec: info.codec,
            channels: info.channels,
            sampling_rate: info.sampling_rate,
        }
    }
}

impl Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ch @ {} Hz",
            self.codec, self.channels, self.sampling_rate
        )
    }
}

/// Run of consecutive frames sharing one format.
#[derive(Debug)]
struct Segment {
    format: StreamFormat,
    first_frame: u64,
    offset: u64,
    frames: u64,
    bytes: u64,
    seconds: f64,
}

#[derive(Debug, Serialize)]
struct FrameIndex {
    input: String,
    frames: Vec<FrameEntry>,
}

#[derive(Debug, Clone, Serialize)]
struct FrameEntry {
    offset: u64,
    codec: String,
    channels: u16,
    sampling_rate: u32,
    size: usize,
    samples: u32,
    /// Presentation time of the first sample.
    time: String,
}

struct AnalysisContext {
    fail_level: Level,
    /// Bytes handed to the parser so far.
    appended: u64,
    frames: u64,
    seconds: f64,
    segments: Vec<Segment>,
    index: Option<Vec<FrameEntry>>,
    trailing_bytes: usize,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn new(fail_level: Level, build_index: bool) -> Self {
        Self {
            fail_level,
            appended: 0,
            frames: 0,
            seconds: 0.0,
            segments: Vec::new(),
            index: build_index.then(Vec::new),
            trailing_bytes: 0,
            pb: None,
        }
    }

    /// Appends `chunk` in pieces that fit the parser, recording every
    /// complete frame on the way.
    fn feed(&mut self, parser: &mut Parser, mut chunk: &[u8]) -> Result<()> {
        while !chunk.is_empty() {
            let n = chunk.len().min(parser.free_space());
            if n == 0 || !parser.append(&chunk[..n], None) {
                bail!("Parser buffer full without a complete frame");
            }
            self.appended += n as u64;
            chunk = &chunk[n..];

            self.drain(parser)?;
        }

        Ok(())
    }

    fn drain(&mut self, parser: &mut Parser) -> Result<()> {
        loop {
            let skipped_before = parser.stats().bytes_skipped;
            let info = parser.current_frame();
            let skipped = parser.stats().bytes_skipped - skipped_before;
            let offset = self.appended - parser.len() as u64;

            if skipped > 0 {
                if self.frames == 0 {
                    log::debug!("Skipped {skipped} bytes before the first frame");
                } else {
                    log_or_err!(
                        self,
                        Level::Warn,
                        anyhow!("Lost sync after frame {}: skipped {skipped} bytes before offset {offset}", self.frames)
                    );
                }
            }

            if !info.is_complete() {
                return Ok(());
            }

            self.record(offset, &info);
            parser.shrink(info.frame_size);
        }
    }

    fn record(&mut self, offset: u64, info: &FrameInfo) {
        let format = StreamFormat::from(info);

        let previous = self.segments.last().map(|s| s.format);
        if previous != Some(format) {
            if let Some(previous) = previous {
                log::info!(
                    "Format change at frame {} (offset {offset}): {previous} -> {format}",
                    self.frames
                );
            }
            self.segments.push(Segment {
                format,
                first_frame: self.frames,
                offset,
                frames: 0,
                bytes: 0,
                seconds: 0.0,
            });
        }

        let seconds = info.duration().unwrap_or_default();
        if let Some(segment) = self.segments.last_mut() {
            segment.frames += 1;
            segment.bytes += info.frame_size as u64;
            segment.seconds += seconds;
        }

        if let Some(index) = &mut self.index {
            index.push(FrameEntry {
                offset,
                codec: info.codec.to_string(),
                channels: info.channels,
                sampling_rate: info.sampling_rate,
                size: info.frame_size,
                samples: info.samples,
                time: time_str(self.seconds),
            });
        }

        self.frames += 1;
        self.seconds += seconds;

        if self.frames.is_multiple_of(100) {
            if let Some(ref pb) = self.pb {
                pb.set_message(format!("Analyzing frames...       {}", self.frames));
                pb.tick();
            }
        }
    }

    /// Reports bytes left over at end of input.
    fn finish(&mut self, parser: &Parser) -> Result<()> {
        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }

        self.trailing_bytes = parser.len();
        if self.trailing_bytes > 0 && self.frames > 0 {
            log_or_err!(
                self,
                Level::Warn,
                anyhow!("{} trailing bytes do not form a complete frame", self.trailing_bytes)
            );
        }

        Ok(())
    }

    fn format_changes(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }
}

fn display_stream_info(context: &AnalysisContext) {
    println!();
    println!("Stream Information");
    println!("==================");
    println!();

    for (i, segment) in context.segments.iter().enumerate() {
        if context.segments.len() > 1 {
            println!("  Segment {i}");
        }
        println!("    Codec                   {}", segment.format.codec);
        println!("    Channels                {}", segment.format.channels);
        println!("    Sampling rate           {} Hz", segment.format.sampling_rate);
        println!("    First frame             {} (offset {})", segment.first_frame, segment.offset);
        println!("    Frames                  {}", segment.frames);
        println!("    Duration                {}", time_str(segment.seconds));
        if segment.seconds > 0.0 {
            let kbps = (segment.bytes as f64 * 8.0) / (segment.seconds * 1000.0);
            println!("    Average data rate       {kbps:.1} kbps");
        }
        println!();
    }
}

fn display_summary(context: &AnalysisContext, parser: &Parser) {
    let stats = parser.stats();
    let total_bytes = context.appended;

    println!("Analysis Summary");
    println!("  Frames processed          {}", context.frames);

    let size_mb = total_bytes as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB ({total_bytes} bytes)");
    println!(
        "  Bytes skipped             {} ({} resyncs)",
        stats.bytes_skipped, stats.resyncs
    );
    if context.trailing_bytes > 0 {
        println!("  Trailing bytes            {}", context.trailing_bytes);
    }
    println!("  Format changes            {}", context.format_changes());
    println!("  Duration                  {}", time_str(context.seconds));

    println!();
}

fn write_frame_index(path: &Path, input: &Path, context: &AnalysisContext) -> Result<()> {
    let frames = context
        .index
        .as_ref()
        .ok_or_else(|| anyhow!("Frame index was not collected"))?;

    let index = FrameIndex {
        input: input.display().to_string(),
        frames: frames.clone(),
    };

    std::fs::write(path, serde_yaml_ng::to_string(&index)?)?;
    log::info!("Wrote index of {} frames to {}", context.frames, path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esframe::process::{
        EXAMPLE_AC3_FRAME_SIZE, EXAMPLE_AC3_HEADER, EXAMPLE_ADTS_FRAME_SIZE, EXAMPLE_ADTS_HEADER,
        example_frame,
    };

    fn stream() -> Vec<u8> {
        let ac3 = example_frame(&EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE);
        let adts = example_frame(&EXAMPLE_ADTS_HEADER, EXAMPLE_ADTS_FRAME_SIZE);

        let mut data = vec![0x42; 5];
        for _ in 0..3 {
            data.extend_from_slice(&ac3);
        }
        for _ in 0..2 {
            data.extend_from_slice(&adts);
        }
        data
    }

    #[test]
    fn records_frames_and_format_changes() -> Result<()> {
        let mut context = AnalysisContext::new(Level::Error, true);
        let mut parser = Parser::default();

        // Odd chunk size splits frames across appends
        for chunk in stream().chunks(77) {
            context.feed(&mut parser, chunk)?;
        }
        context.finish(&parser)?;

        assert_eq!(context.frames, 5);
        assert_eq!(context.format_changes(), 1);
        assert_eq!(context.segments[0].format.codec, Codec::Ac3);
        assert_eq!(context.segments[1].format.codec, Codec::Aac);
        assert_eq!(context.segments[1].first_frame, 3);
        assert_eq!(parser.stats().bytes_skipped, 5);

        let index = context.index.as_ref().ok_or_else(|| anyhow!("no index"))?;
        let offsets: Vec<u64> = index.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, [5, 133, 261, 389, 589]);
        assert_eq!(index[0].time, "00:00:00.000");
        assert_eq!(index[4].samples, 1024);

        let yaml = serde_yaml_ng::to_string(&FrameIndex {
            input: "test".to_string(),
            frames: index.clone(),
        })?;
        assert!(yaml.contains("codec: AC-3"));
        Ok(())
    }

    #[test]
    fn strict_mode_fails_on_lost_sync() {
        let ac3 = example_frame(&EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE);
        let mut data = ac3.clone();
        data.extend_from_slice(&ac3);
        data.extend_from_slice(&[0x42; 9]);
        data.extend_from_slice(&ac3);

        let mut context = AnalysisContext::new(Level::Warn, false);
        let mut parser = Parser::default();

        assert!(context.feed(&mut parser, &data).is_err());
    }
}
