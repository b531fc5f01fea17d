use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::timestamp::time_str;
use esframe::process::drive::DriveStats;

/// Byte-based bar for files, spinner for pipes.
pub fn create_progress_bar(multi: &MultiProgress, total_bytes: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_bytes {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("waiting for first frame");
    Ok(pb)
}

pub fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    total_bytes: Option<u64>,
    stats: &DriveStats,
    start_time: Instant,
) {
    if let Some(pb) = pb {
        let elapsed = start_time.elapsed();
        let audio_secs = stats.duration.as_secs_f64();
        let realtime_multiplier = if elapsed.as_secs_f64() > 0.0 {
            audio_secs / elapsed.as_secs_f64()
        } else {
            0.0
        };

        if total_bytes.is_some() {
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }

        pb.finish_with_message(format!(
            "{} frames | speed: {realtime_multiplier:.1}x | duration: {}",
            stats.frames_emitted,
            time_str(audio_secs)
        ));
    }
}
