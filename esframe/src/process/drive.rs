use std::fmt::Display;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{Level, debug, info, trace};

use crate::log_or_err;
use crate::process::shared::{SharedParser, WorkerRunning};
use crate::structs::codec::{Codec, FrameInfo};
use crate::utils::errors::DriveError;

/// Longest sleep while waiting for input.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(10);

/// Sleep between output buffer requests while the sink is full.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Decodes one compressed frame to interleaved signed 16-bit PCM.
pub trait FrameDecoder: Send {
    /// Appends the decoded samples of `frame` to `pcm`.
    fn decode(&mut self, frame: &[u8], info: &FrameInfo, pcm: &mut Vec<i16>) -> Result<()>;

    /// Drops inter-frame state after a reset.
    fn flush(&mut self) {}
}

/// Configuration the output pipeline is set up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSetup {
    pub codec: Codec,
    pub channels: u16,
    pub sampling_rate: u32,
    /// Compressed frames are forwarded as they are.
    pub passthrough: bool,
}

impl Display for OutputSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ch @ {} Hz{}",
            self.codec,
            self.channels,
            self.sampling_rate,
            if self.passthrough { " (passthrough)" } else { "" }
        )
    }
}

/// A buffer obtained from an [`OutputSink`].
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pub data: Vec<u8>,
    pub timestamp: Option<i64>,
}

/// Receiver of decoded or passed-through frames.
pub trait OutputSink: Send {
    /// Reconfigures the pipeline and returns the channel count it will
    /// consume, which may be wider than `setup.channels`.
    fn configure(&mut self, setup: &OutputSetup) -> Result<u16>;

    /// Largest buffer [`request_buffer`](Self::request_buffer) can ever return.
    fn max_buffer_size(&self) -> usize;

    /// Returns a buffer of at least `size` bytes, or `None` if none is free
    /// right now.
    fn request_buffer(&mut self, size: usize, timestamp: Option<i64>)
    -> Result<Option<OutputBuffer>>;

    fn submit(&mut self, buffer: OutputBuffer) -> Result<()>;

    /// Drops queued output after a reset.
    fn flush(&mut self) {}

    /// Called once when the loop ends without error.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveState {
    #[default]
    Idle,
    Detecting,
    Decoding,
    Emitting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub frames_emitted: u64,
    pub bytes_emitted: u64,
    /// Samples per channel of all emitted frames.
    pub samples_emitted: u64,
    /// Playback time of all emitted frames.
    pub duration: Duration,
    pub setup_changes: u64,
    pub resets: u64,
    pub errors: u64,
}

#[derive(Debug)]
struct Pending {
    data: Vec<u8>,
    timestamp: Option<i64>,
    samples: u32,
    duration: Duration,
}

/// Consumes frames from a [`SharedParser`] and feeds them to an output sink.
///
/// Each iteration takes the current frame, reconfigures the sink when the
/// stream format changed, decodes or copies the frame, shrinks the parser by
/// the frame size and emits the result. Hard errors raise a reset of the
/// shared parser instead of ending the loop, unless `fail_level` says
/// otherwise.
pub struct DriveLoop {
    shared: SharedParser,
    decoder: Option<Box<dyn FrameDecoder>>,
    sink: Box<dyn OutputSink>,
    setup: Option<OutputSetup>,
    sink_channels: u16,
    passthrough: bool,
    state: DriveState,
    frame: Vec<u8>,
    pcm: Vec<i16>,
    pending: Option<Pending>,
    stats: DriveStats,
    idle_timeout: Duration,
    poll_interval: Duration,
    fail_level: Level,
}

impl DriveLoop {
    /// Creates a loop without a decoder: compressed frames are passed through.
    pub fn new(shared: SharedParser, sink: Box<dyn OutputSink>) -> Self {
        Self {
            shared,
            decoder: None,
            sink,
            setup: None,
            sink_channels: 0,
            passthrough: false,
            state: DriveState::Idle,
            frame: Vec::new(),
            pcm: Vec::new(),
            pending: None,
            stats: DriveStats::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fail_level: Level::Error,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Forwards compressed frames even when a decoder is present.
    pub fn set_passthrough(&mut self, passthrough: bool) {
        self.passthrough = passthrough;
    }

    /// Sets the failure level for hard errors.
    ///
    /// - `log::Level::Error`: log, reset the stream and continue (default)
    /// - `log::Level::Warn`: return the error from [`run`](Self::run) (strict mode)
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = timeout;
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn stats(&self) -> DriveStats {
        self.stats
    }

    pub fn setup(&self) -> Option<OutputSetup> {
        self.setup
    }

    /// Runs the loop on a new thread.
    pub fn spawn(mut self) -> thread::JoinHandle<Result<DriveStats>> {
        let running = WorkerRunning::new(&self.shared);
        thread::spawn(move || {
            let _running = running;
            self.run()
        })
    }

    /// Runs until [`SharedParser::stop`] is called, or until
    /// [`SharedParser::finish`] was called and no complete frame remains.
    pub fn run(&mut self) -> Result<DriveStats> {
        let _running = WorkerRunning::new(&self.shared);
        let result = self.run_loop().and_then(|_| self.sink.finish());
        self.state = DriveState::Idle;

        result.map(|_| self.stats)
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            if self.shared.stop_requested() {
                debug!("Drive loop stopped");
                return Ok(());
            }

            if self.shared.reset_requested() {
                self.reset();
                continue;
            }

            if self.pending.is_none() && !self.produce()? {
                if self.shared.is_finished() && self.shared.lock().is_empty() {
                    debug!("End of stream: {} frames emitted", self.stats.frames_emitted);
                    return Ok(());
                }

                self.state = DriveState::Idle;
                self.shared.wait_for_data(self.idle_timeout);
                continue;
            }

            self.emit()?;
        }
    }

    /// Takes the current frame off the parser and renders it into `pending`.
    ///
    /// Returns `false` when no complete frame is buffered.
    fn produce(&mut self) -> Result<bool> {
        self.state = DriveState::Detecting;

        let (info, timestamp) = {
            let mut parser = self.shared.lock();
            let info = parser.current_frame();
            if !info.is_complete() {
                return Ok(false);
            }

            self.frame.clear();
            self.frame.extend_from_slice(parser.frame_data());
            let timestamp = parser.front_timestamp();
            parser.shrink(info.frame_size);

            (info, timestamp)
        };

        trace!("Frame: {info}, timestamp {timestamp:?}");

        let setup = OutputSetup {
            codec: info.codec,
            channels: info.channels,
            sampling_rate: info.sampling_rate,
            passthrough: self.uses_passthrough(info.codec),
        };

        if self.setup != Some(setup) {
            if let Err(e) = self.reconfigure(setup) {
                self.fail(e)?;
                return Ok(true);
            }
        }

        self.state = DriveState::Decoding;
        match self.render(&info, setup.passthrough) {
            Ok(data) => {
                self.pending = Some(Pending {
                    data,
                    timestamp,
                    samples: info.samples,
                    duration: info.duration().map_or(Duration::ZERO, Duration::from_secs_f64),
                })
            }
            Err(e) => self.fail(e)?,
        }

        Ok(true)
    }

    fn uses_passthrough(&self, codec: Codec) -> bool {
        codec.supports_passthrough() && (self.passthrough || self.decoder.is_none())
    }

    fn reconfigure(&mut self, setup: OutputSetup) -> Result<(), DriveError> {
        match self.setup {
            Some(old) => info!("Setup changed: {old} -> {setup}"),
            None => info!("Output setup: {setup}"),
        }

        let channels = self
            .sink
            .configure(&setup)
            .map_err(|e| DriveError::SetupRejected(format!("{setup}: {e}")))?;

        if channels != setup.channels {
            debug!("Sink consumes {channels} channels for {} decoded", setup.channels);
        }

        self.sink_channels = channels;
        self.setup = Some(setup);
        self.stats.setup_changes += 1;

        Ok(())
    }

    fn render(&mut self, info: &FrameInfo, passthrough: bool) -> Result<Vec<u8>, DriveError> {
        if passthrough {
            return Ok(self.frame.clone());
        }

        self.pcm.clear();
        if info.codec == Codec::Pcm {
            self.pcm.extend(
                self.frame
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
        } else {
            let Some(decoder) = self.decoder.as_mut() else {
                return Err(DriveError::DecodeFailed {
                    codec: info.codec,
                    size: self.frame.len(),
                    reason: "no decoder".to_string(),
                });
            };

            decoder
                .decode(&self.frame, info, &mut self.pcm)
                .map_err(|e| DriveError::DecodeFailed {
                    codec: info.codec,
                    size: self.frame.len(),
                    reason: e.to_string(),
                })?;
        }

        let data = if info.channels == 6 && self.sink_channels == 8 {
            let mut wide = Vec::with_capacity(self.pcm.len() / 6 * 8);
            expand_5_1_to_8(&self.pcm, &mut wide);
            samples_to_bytes(&wide)
        } else {
            samples_to_bytes(&self.pcm)
        };

        Ok(data)
    }

    fn emit(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        self.state = DriveState::Emitting;

        let size = pending.data.len();
        let max = self.sink.max_buffer_size();
        if size > max {
            return self.fail(DriveError::OutputTooLarge { size, max });
        }

        loop {
            match self.sink.request_buffer(size, pending.timestamp) {
                Ok(Some(mut buffer)) => {
                    buffer.data.clear();
                    buffer.data.extend_from_slice(&pending.data);
                    buffer.timestamp = pending.timestamp;

                    if let Err(e) = self.sink.submit(buffer) {
                        return self.fail(DriveError::SubmitFailed(e.to_string()));
                    }

                    self.stats.frames_emitted += 1;
                    self.stats.bytes_emitted += size as u64;
                    self.stats.samples_emitted += pending.samples as u64;
                    self.stats.duration += pending.duration;
                    self.state = DriveState::Idle;
                    return Ok(());
                }
                Ok(None) => {
                    if self.shared.stop_requested() || self.shared.reset_requested() {
                        self.pending = Some(pending);
                        return Ok(());
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return self.fail(DriveError::BufferRequestFailed(e.to_string())),
            }
        }
    }

    fn fail(&mut self, err: DriveError) -> Result<()> {
        self.stats.errors += 1;
        log_or_err!(self, Level::Warn, err);

        self.pending = None;
        self.shared.raise_reset();

        Ok(())
    }

    fn reset(&mut self) {
        self.pending = None;
        self.setup = None;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        self.sink.flush();
        self.shared.complete_reset();

        self.stats.resets += 1;
        self.state = DriveState::Idle;
    }
}

/// Widens interleaved 5.1 samples to 8 channels, appending two silent
/// channels to each sample frame.
pub fn expand_5_1_to_8(samples: &[i16], out: &mut Vec<i16>) {
    for frame in samples.chunks_exact(6) {
        out.extend_from_slice(frame);
        out.extend_from_slice(&[0, 0]);
    }
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;

    use super::*;
    use crate::process::parse::Parser;
    use crate::process::{
        EXAMPLE_AC3_FRAME_SIZE, EXAMPLE_AC3_HEADER, EXAMPLE_EAC3_FRAME_SIZE, EXAMPLE_EAC3_HEADER,
        EXAMPLE_MPEG_FRAME_SIZE, EXAMPLE_MPEG_HEADER, example_frame,
    };
    use crate::structs::codec::PcmFormat;
    use crate::utils::buffer_pool::BufferPool;

    #[derive(Default)]
    struct Record {
        setups: Vec<OutputSetup>,
        buffers: Vec<(Vec<u8>, Option<i64>)>,
        flushes: usize,
        finished: bool,
    }

    struct TestSink {
        pool: BufferPool,
        wide_5_1: bool,
        busy_polls: usize,
        record: Arc<Mutex<Record>>,
    }

    impl TestSink {
        fn new(max_slot_size: usize) -> (Self, Arc<Mutex<Record>>) {
            let record = Arc::new(Mutex::new(Record::default()));
            let sink = Self {
                pool: BufferPool::new(4, max_slot_size),
                wide_5_1: false,
                busy_polls: 0,
                record: record.clone(),
            };
            (sink, record)
        }
    }

    impl OutputSink for TestSink {
        fn configure(&mut self, setup: &OutputSetup) -> Result<u16> {
            self.record.lock().unwrap().setups.push(*setup);
            Ok(if setup.channels == 6 && self.wide_5_1 { 8 } else { setup.channels })
        }

        fn max_buffer_size(&self) -> usize {
            self.pool.max_slot_size()
        }

        fn request_buffer(
            &mut self,
            size: usize,
            timestamp: Option<i64>,
        ) -> Result<Option<OutputBuffer>> {
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                return Ok(None);
            }
            Ok(self
                .pool
                .try_acquire(size)
                .map(|data| OutputBuffer { data, timestamp }))
        }

        fn submit(&mut self, buffer: OutputBuffer) -> Result<()> {
            self.record
                .lock()
                .unwrap()
                .buffers
                .push((buffer.data.clone(), buffer.timestamp));
            self.pool.release(buffer.data);
            Ok(())
        }

        fn flush(&mut self) {
            self.record.lock().unwrap().flushes += 1;
        }

        fn finish(&mut self) -> Result<()> {
            self.record.lock().unwrap().finished = true;
            Ok(())
        }
    }

    /// Emits `samples * channels` copies of 1..=channels, failing on call `fail_on`.
    struct TestDecoder {
        calls: usize,
        fail_on: Option<usize>,
    }

    impl FrameDecoder for TestDecoder {
        fn decode(&mut self, _frame: &[u8], info: &FrameInfo, pcm: &mut Vec<i16>) -> Result<()> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                bail!("corrupt frame");
            }
            for _ in 0..info.samples {
                pcm.extend(1..=info.channels as i16);
            }
            Ok(())
        }
    }

    fn ac3_frames(shared: &SharedParser, timestamps: &[i64]) -> Vec<u8> {
        let frame = example_frame(&EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE);
        for &ts in timestamps {
            assert!(shared.append(&frame, Some(ts)));
        }
        frame
    }

    #[test]
    fn passthrough_keeps_order_and_timestamps() -> Result<()> {
        let shared = SharedParser::default();
        let frame = ac3_frames(&shared, &[100, 200, 300]);
        shared.finish();

        let (sink, record) = TestSink::new(4096);
        let mut drive = DriveLoop::new(shared.clone(), Box::new(sink));
        let stats = drive.run()?;

        assert_eq!(stats.frames_emitted, 3);
        assert_eq!(stats.samples_emitted, 3 * 1536);
        assert!((stats.duration.as_secs_f64() - 0.096).abs() < 1e-6);
        assert_eq!(stats.setup_changes, 1);

        let record = record.lock().unwrap();
        assert!(record.setups[0].passthrough);
        let timestamps: Vec<_> = record.buffers.iter().map(|(_, ts)| *ts).collect();
        assert_eq!(timestamps, [Some(100), Some(200), Some(300)]);
        assert!(record.buffers.iter().all(|(data, _)| *data == frame));
        assert!(record.finished);
        assert_eq!(drive.state(), DriveState::Idle);
        Ok(())
    }

    #[test]
    fn codec_switch_reconfigures_sink() -> Result<()> {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[1, 2, 3]);
        let mpeg = example_frame(&EXAMPLE_MPEG_HEADER, EXAMPLE_MPEG_FRAME_SIZE);
        assert!(shared.append(&mpeg, Some(4)));
        assert!(shared.append(&mpeg, Some(5)));
        shared.finish();

        let (sink, record) = TestSink::new(4096);
        let stats = DriveLoop::new(shared, Box::new(sink)).run()?;

        assert_eq!(stats.frames_emitted, 5);
        assert_eq!(stats.setup_changes, 2);

        let record = record.lock().unwrap();
        assert_eq!(record.setups[0].codec, Codec::Ac3);
        assert_eq!(record.setups[1].codec, Codec::Mpeg);
        assert_eq!(record.setups[1].sampling_rate, 44100);
        Ok(())
    }

    #[test]
    fn pcm_five_one_is_widened_for_eight_channel_sink() -> Result<()> {
        let mut parser = Parser::default();
        parser.set_pcm_format(Some(PcmFormat {
            channels: 6,
            sampling_rate: 48000,
        }));
        let shared = SharedParser::new(parser);

        let samples: Vec<i16> = (1..=12).collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert!(shared.append(&bytes, Some(0)));
        shared.finish();

        let (mut sink, record) = TestSink::new(4096);
        sink.wide_5_1 = true;
        let stats = DriveLoop::new(shared, Box::new(sink)).run()?;
        assert_eq!(stats.frames_emitted, 1);

        let record = record.lock().unwrap();
        assert!(!record.setups[0].passthrough);
        let out: Vec<i16> = record.buffers[0]
            .0
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0]);
        Ok(())
    }

    #[test]
    fn decoded_eac3_is_widened() -> Result<()> {
        let shared = SharedParser::default();
        let frame = example_frame(&EXAMPLE_EAC3_HEADER, EXAMPLE_EAC3_FRAME_SIZE);
        assert!(shared.append(&frame, Some(42)));
        shared.finish();

        let (mut sink, record) = TestSink::new(64 * 1024);
        sink.wide_5_1 = true;
        let decoder = TestDecoder {
            calls: 0,
            fail_on: None,
        };
        let stats = DriveLoop::new(shared, Box::new(sink))
            .with_decoder(Box::new(decoder))
            .run()?;

        assert_eq!(stats.frames_emitted, 1);
        let record = record.lock().unwrap();
        // 1536 samples of 8 channels, 2 bytes each.
        assert_eq!(record.buffers[0].0.len(), 1536 * 8 * 2);
        assert_eq!(record.buffers[0].1, Some(42));
        Ok(())
    }

    #[test]
    fn decode_failure_resets_stream() -> Result<()> {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[1, 2, 3]);
        shared.finish();

        let (sink, record) = TestSink::new(64 * 1024);
        let decoder = TestDecoder {
            calls: 0,
            fail_on: Some(2),
        };
        let stats = DriveLoop::new(shared.clone(), Box::new(sink))
            .with_decoder(Box::new(decoder))
            .run()?;

        assert_eq!(stats.frames_emitted, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.resets, 1);
        assert_eq!(shared.lock().len(), 0);
        assert!(!shared.reset_requested());
        assert_eq!(record.lock().unwrap().flushes, 1);
        Ok(())
    }

    #[test]
    fn strict_mode_returns_decode_failure() {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[1]);
        shared.finish();

        let (sink, _record) = TestSink::new(64 * 1024);
        let decoder = TestDecoder {
            calls: 0,
            fail_on: Some(1),
        };
        let mut drive = DriveLoop::new(shared, Box::new(sink)).with_decoder(Box::new(decoder));
        drive.set_fail_level(Level::Warn);

        let err = drive.run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DriveError>(),
            Some(DriveError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn oversized_output_resets_stream() -> Result<()> {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[1, 2]);
        shared.finish();

        let (sink, record) = TestSink::new(64);
        let stats = DriveLoop::new(shared, Box::new(sink)).run()?;

        assert_eq!(stats.frames_emitted, 0);
        assert_eq!(stats.resets, 1);
        assert!(record.lock().unwrap().buffers.is_empty());
        Ok(())
    }

    #[test]
    fn busy_sink_is_polled() -> Result<()> {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[7]);
        shared.finish();

        let (mut sink, record) = TestSink::new(4096);
        sink.busy_polls = 3;
        let mut drive = DriveLoop::new(shared, Box::new(sink));
        drive.set_poll_interval(Duration::from_millis(1));

        assert_eq!(drive.run()?.frames_emitted, 1);
        assert_eq!(record.lock().unwrap().buffers[0].1, Some(7));
        Ok(())
    }

    struct CrashingSink;

    impl OutputSink for CrashingSink {
        fn configure(&mut self, setup: &OutputSetup) -> Result<u16> {
            Ok(setup.channels)
        }

        fn max_buffer_size(&self) -> usize {
            4096
        }

        fn request_buffer(
            &mut self,
            size: usize,
            timestamp: Option<i64>,
        ) -> Result<Option<OutputBuffer>> {
            Ok(Some(OutputBuffer {
                data: Vec::with_capacity(size),
                timestamp,
            }))
        }

        fn submit(&mut self, _buffer: OutputBuffer) -> Result<()> {
            panic!("sink crashed");
        }
    }

    #[test]
    fn reset_after_worker_panic_does_not_hang() {
        let shared = SharedParser::default();
        ac3_frames(&shared, &[1, 2]);

        let handle = DriveLoop::new(shared.clone(), Box::new(CrashingSink)).spawn();
        assert!(handle.join().is_err());

        // No loop is left to serve the request, so it completes here.
        shared.request_reset();
        assert_eq!(shared.lock().len(), 0);
        assert!(!shared.reset_requested());
    }

    #[test]
    fn reset_request_is_honored_by_running_loop() -> Result<()> {
        let shared = SharedParser::default();
        // Header only: the loop idles waiting for the rest of the frame.
        assert!(shared.append(&EXAMPLE_AC3_HEADER, Some(1)));

        let (sink, _record) = TestSink::new(4096);
        let mut drive = DriveLoop::new(shared.clone(), Box::new(sink));
        drive.set_idle_timeout(Duration::from_millis(1));
        let handle = drive.spawn();

        shared.request_reset();
        assert_eq!(shared.lock().len(), 0);

        shared.stop();
        let stats = handle.join().unwrap()?;
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.frames_emitted, 0);
        Ok(())
    }
}
