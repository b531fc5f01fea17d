use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::process::parse::Parser;

/// Interval at which [`SharedParser::request_reset`] polls for completion.
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A [`Parser`] shared between producers and one drive loop.
///
/// All parser operations run under one mutex. Producers never block on
/// space: [`append`](Self::append) returns `false` when the data does not
/// fit. The consumer sleeps on a condition variable that successful appends
/// signal.
///
/// # Example
///
/// ```rust
/// use esframe::process::shared::SharedParser;
/// use esframe::process::{EXAMPLE_ADTS_HEADER, EXAMPLE_ADTS_FRAME_SIZE, example_frame};
/// use std::thread;
/// use std::time::Duration;
///
/// let shared = SharedParser::default();
/// let producer = shared.clone();
///
/// let handle = thread::spawn(move || {
///     let frame = example_frame(&EXAMPLE_ADTS_HEADER, EXAMPLE_ADTS_FRAME_SIZE);
///     while producer.free_space() < frame.len() {
///         thread::sleep(Duration::from_millis(1));
///     }
///     assert!(producer.append(&frame, Some(90_000)));
///     producer.finish();
/// });
///
/// while !shared.wait_for_data(Duration::from_millis(10)) {}
/// assert_eq!(shared.lock().front_timestamp(), Some(90_000));
/// handle.join().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedParser {
    inner: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    parser: Mutex<Parser>,
    data_ready: Condvar,
    reset_requested: AtomicBool,
    finished: AtomicBool,
    stop_requested: AtomicBool,
    worker_running: AtomicBool,
}

impl SharedParser {
    pub fn new(parser: Parser) -> Self {
        Self {
            inner: Arc::new(Shared {
                parser: Mutex::new(parser),
                data_ready: Condvar::new(),
                reset_requested: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                worker_running: AtomicBool::new(false),
            }),
        }
    }

    /// Locks the parser for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, Parser> {
        self.inner
            .parser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends bytes and wakes the consumer. Never blocks on space.
    pub fn append(&self, bytes: &[u8], timestamp: Option<i64>) -> bool {
        let accepted = self.lock().append(bytes, timestamp);
        if accepted {
            self.inner.data_ready.notify_one();
        }
        accepted
    }

    pub fn free_space(&self) -> usize {
        self.lock().free_space()
    }

    /// Waits up to `timeout` for a complete frame.
    ///
    /// Returns `true` if a frame is buffered. Also returns early when a
    /// reset, stop or end of stream is signalled.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let mut parser = self.lock();
        if !parser.is_empty() {
            return true;
        }
        if self.reset_requested() || self.stop_requested() || self.is_finished() {
            return false;
        }

        parser = self
            .inner
            .data_ready
            .wait_timeout(parser, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0;

        !parser.is_empty()
    }

    /// Asks the drive loop to discard all buffered state and waits until it
    /// has done so.
    ///
    /// Without a running drive loop the parser is reset right away.
    pub fn request_reset(&self) {
        self.raise_reset();

        while self.reset_requested() {
            if !self.inner.worker_running.load(Ordering::Acquire) {
                self.complete_reset();
                break;
            }
            thread::sleep(RESET_POLL_INTERVAL);
        }
    }

    /// Flags a reset for the next safe point of the drive loop, no waiting.
    pub fn raise_reset(&self) {
        self.inner.reset_requested.store(true, Ordering::Release);
        self.inner.data_ready.notify_all();
    }

    pub fn reset_requested(&self) -> bool {
        self.inner.reset_requested.load(Ordering::Acquire)
    }

    /// Resets the parser and clears the request flag.
    pub(crate) fn complete_reset(&self) {
        self.lock().reset();
        self.inner.reset_requested.store(false, Ordering::Release);
        debug!("Parser reset");
    }

    /// Marks the end of input. The drive loop drains complete frames and
    /// returns.
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
        self.inner.data_ready.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Ends the drive loop at its next safe point without draining.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
        self.inner.data_ready.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }

}

/// Marks a drive loop as running until dropped, unwinding included.
pub(crate) struct WorkerRunning(SharedParser);

impl WorkerRunning {
    pub(crate) fn new(shared: &SharedParser) -> Self {
        shared.inner.worker_running.store(true, Ordering::Release);
        Self(shared.clone())
    }
}

impl Drop for WorkerRunning {
    fn drop(&mut self) {
        self.0.inner.worker_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{EXAMPLE_AC3_FRAME_SIZE, EXAMPLE_AC3_HEADER, example_frame};

    #[test]
    fn append_wakes_waiting_consumer() {
        let shared = SharedParser::default();
        let producer = shared.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let frame = example_frame(&EXAMPLE_AC3_HEADER, EXAMPLE_AC3_FRAME_SIZE);
            assert!(producer.append(&frame, Some(1)));
        });

        let mut ready = false;
        for _ in 0..500 {
            if shared.wait_for_data(Duration::from_millis(10)) {
                ready = true;
                break;
            }
        }
        handle.join().unwrap();

        assert!(ready);
        assert_eq!(shared.lock().current_frame().frame_size, EXAMPLE_AC3_FRAME_SIZE);
    }

    #[test]
    fn reset_without_worker_completes_immediately() {
        let shared = SharedParser::default();
        assert!(shared.append(&[1, 2, 3], Some(9)));

        shared.request_reset();
        assert!(!shared.reset_requested());
        assert_eq!(shared.lock().len(), 0);
        assert_eq!(shared.lock().front_timestamp(), None);
    }

    #[test]
    fn wait_returns_early_after_finish() {
        let shared = SharedParser::default();
        shared.finish();
        assert!(!shared.wait_for_data(Duration::from_secs(10)));
    }
}
