use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use indicatif::ProgressBar;

use crate::input::InputReader;
use esframe::process::shared::SharedParser;

/// Sleep while the parser has no room for the next piece of input.
const APPEND_RETRY_INTERVAL: Duration = Duration::from_millis(1);

pub struct ProducerConfig {
    pub input_path: PathBuf,
    pub chunk_size: usize,
    pub start_pts: Option<i64>,
    pub shared: SharedParser,
    pub pb: Option<ProgressBar>,
}

/// Reads the input on a new thread and appends it to the shared parser.
///
/// The parser is marked finished when reading ends, successfully or not, so
/// the drive loop always drains and returns. Yields the number of bytes read.
pub fn spawn_producer(config: ProducerConfig) -> thread::JoinHandle<Result<u64>> {
    thread::spawn(move || -> Result<u64> {
        let ProducerConfig {
            input_path,
            chunk_size,
            start_pts,
            shared,
            pb,
        } = config;

        let mut input_reader = InputReader::new(&input_path)?;
        let result = produce(&mut input_reader, chunk_size, start_pts, &shared, pb.as_ref());
        shared.finish();

        result
    })
}

fn produce(
    input_reader: &mut InputReader,
    chunk_size: usize,
    start_pts: Option<i64>,
    shared: &SharedParser,
    pb: Option<&ProgressBar>,
) -> Result<u64> {
    let mut bytes_read = 0u64;
    let mut timestamp = start_pts;

    input_reader.process_chunks(chunk_size, |chunk| {
        if !append_all(shared, chunk, &mut timestamp) {
            log::debug!("Producer stopped after {bytes_read} bytes");
            return Ok(false);
        }

        bytes_read += chunk.len() as u64;
        if let Some(pb) = pb {
            pb.set_position(bytes_read);
        }

        Ok(true)
    })?;

    log::debug!("Input exhausted after {bytes_read} bytes");
    Ok(bytes_read)
}

/// Appends `chunk` in pieces as space frees up. Only the first piece carries
/// `timestamp`, which is taken.
///
/// Returns `false` if the drive loop was stopped before everything fit.
fn append_all(shared: &SharedParser, mut chunk: &[u8], timestamp: &mut Option<i64>) -> bool {
    while !chunk.is_empty() {
        if shared.stop_requested() {
            return false;
        }

        let n = chunk.len().min(shared.free_space());
        if n == 0 || !shared.append(&chunk[..n], *timestamp) {
            thread::sleep(APPEND_RETRY_INTERVAL);
            continue;
        }

        *timestamp = None;
        chunk = &chunk[n..];
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use esframe::process::parse::Parser;
    use esframe::process::{EXAMPLE_MPEG_FRAME_SIZE, EXAMPLE_MPEG_HEADER, example_frame};

    #[test]
    fn oversized_chunk_is_split_and_keeps_first_timestamp() {
        let shared = SharedParser::new(Parser::with_capacity(1024));
        let frame = example_frame(&EXAMPLE_MPEG_HEADER, EXAMPLE_MPEG_FRAME_SIZE);
        let chunk: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 4).collect();

        let consumer = shared.clone();
        let handle = thread::spawn(move || {
            let mut frames = Vec::new();
            while frames.len() < 4 {
                let mut parser = consumer.lock();
                let info = parser.current_frame();
                if info.is_complete() {
                    frames.push(parser.front_timestamp());
                    parser.shrink(info.frame_size);
                } else {
                    drop(parser);
                    thread::sleep(Duration::from_millis(1));
                }
            }
            frames
        });

        let mut timestamp = Some(3600);
        assert!(append_all(&shared, &chunk, &mut timestamp));
        assert_eq!(timestamp, None);

        let frames = handle.join().unwrap();
        assert_eq!(frames[0], Some(3600));
        assert!(frames[1..].iter().all(Option::is_none));
    }

    #[test]
    fn stop_interrupts_waiting_producer() {
        let shared = SharedParser::new(Parser::with_capacity(256));
        shared.stop();

        let mut timestamp = None;
        assert!(!append_all(&shared, &[0u8; 1024], &mut timestamp));
    }
}
