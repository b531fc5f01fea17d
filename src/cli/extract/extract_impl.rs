use std::fs::File;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use indicatif::MultiProgress;

use super::producer::{ProducerConfig, spawn_producer};
use super::progress::{create_progress_bar, finalize_progress_bar};
use super::sink::FileSink;
use crate::cli::command::{Cli, ExtractArgs, OutputFormat};
use crate::input::input_size;
use crate::timestamp::time_str;
use esframe::process::drive::DriveLoop;
use esframe::process::parse::Parser;
use esframe::process::shared::SharedParser;
use esframe::structs::codec::PcmFormat;

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    if args.chunk_size == 0 {
        bail!("--chunk-size must be at least 1 byte");
    }
    if args.format == OutputFormat::Wav && args.pcm_channels.is_none() {
        bail!("WAV output needs PCM input, declare it with --pcm-channels");
    }

    log::info!(
        "Extracting stream: {} -> {} (strict mode: {})",
        args.input.display(),
        args.output.display(),
        cli.strict
    );

    let mut parser = Parser::default();
    if let Some(channels) = args.pcm_channels {
        let format = PcmFormat {
            channels,
            sampling_rate: args.pcm_rate,
        };
        log::info!("Input declared as PCM: {channels} ch @ {} Hz", format.sampling_rate);
        parser.set_pcm_format(Some(format));
    }
    let shared = SharedParser::new(parser);

    let total_bytes = input_size(&args.input);
    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_bytes)?),
        None => None,
    };

    let sink = FileSink::new(File::create(&args.output)?, args.format, args.expand_5_1);
    let mut drive = DriveLoop::new(shared.clone(), Box::new(sink));
    drive.set_fail_level(cli.fail_level());

    let start_time = Instant::now();
    let drive_thread = drive.spawn();

    let producer_thread = spawn_producer(ProducerConfig {
        input_path: args.input.clone(),
        chunk_size: args.chunk_size,
        start_pts: args.start_pts,
        shared: shared.clone(),
        pb: pb.clone(),
    });

    // The drive loop returns after the producer finished, or early on error.
    let drive_result = join(drive_thread, "Drive loop");
    shared.stop();
    let producer_result = join(producer_thread, "Producer");

    let (stats, bytes_read) = match (drive_result, producer_result) {
        (Ok(stats), Ok(bytes_read)) => (stats, bytes_read),
        (Err(e), _) | (_, Err(e)) => {
            if let Some(pb) = pb {
                pb.finish_with_message("extraction failed");
            }
            return Err(e);
        }
    };

    finalize_progress_bar(&pb, total_bytes, &stats, start_time);

    let parser_stats = shared.lock().stats();
    log::info!(
        "Extracted {} frames ({} bytes, {}) from {bytes_read} input bytes",
        stats.frames_emitted,
        stats.bytes_emitted,
        time_str(stats.duration.as_secs_f64())
    );
    log::info!(
        "{} setup changes, {} resets, {} errors, {} bytes skipped in {} resyncs",
        stats.setup_changes,
        stats.resets,
        stats.errors,
        parser_stats.bytes_skipped,
        parser_stats.resyncs
    );

    if stats.frames_emitted == 0 {
        log::warn!("No frame was extracted");
    }

    Ok(())
}

fn join<T>(handle: JoinHandle<Result<T>>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} thread panicked"))?
}
