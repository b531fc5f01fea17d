//! Presentation timestamp bookkeeping for buffered stream data.
//!
//! Every accepted append contributes one [`PendingSegment`]. The segments
//! mirror the decode buffer byte for byte, so the timestamp of the segment
//! at the front is the one attributed to the next frame.

use std::collections::VecDeque;

use log::trace;

/// Byte span contributed by one append call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSegment {
    pub timestamp: Option<i64>,
    pub length: usize,
}

#[derive(Debug, Default)]
pub struct TimestampQueue {
    segments: VecDeque<PendingSegment>,
}

impl TimestampQueue {
    pub fn push_segment(&mut self, timestamp: Option<i64>, length: usize) {
        if length == 0 {
            return;
        }

        self.segments.push_back(PendingSegment { timestamp, length });
    }

    pub fn front_timestamp(&self) -> Option<i64> {
        self.segments.front().and_then(|s| s.timestamp)
    }

    /// Removes `n` bytes worth of segments from the front.
    ///
    /// The front timestamp is dropped before anything is consumed, and a
    /// segment that is only partly consumed keeps no timestamp: the bytes
    /// left in it no longer start where that timestamp pointed.
    pub fn consume(&mut self, mut n: usize) {
        if n == 0 {
            return;
        }

        if let Some(front) = self.segments.front_mut() {
            front.timestamp = None;
        }

        while n > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };

            if front.length <= n {
                n -= front.length;
                self.segments.pop_front();
            } else {
                front.length -= n;
                if let Some(pts) = front.timestamp.take() {
                    trace!("Dropping timestamp {pts} of partially consumed segment");
                }
                n = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment lengths; equals the decode buffer size.
    pub fn total_length(&self) -> usize {
        self.segments.iter().map(|s| s.length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_whole_segments_keeps_next_timestamp() {
        let mut queue = TimestampQueue::default();
        queue.push_segment(Some(1000), 100);
        queue.push_segment(Some(2000), 50);

        assert_eq!(queue.front_timestamp(), Some(1000));
        queue.consume(100);
        assert_eq!(queue.front_timestamp(), Some(2000));
        assert_eq!(queue.total_length(), 50);
    }

    #[test]
    fn partial_consume_invalidates_timestamp() {
        let mut queue = TimestampQueue::default();
        queue.push_segment(Some(1000), 100);
        queue.push_segment(Some(2000), 50);

        queue.consume(40);
        assert_eq!(queue.front_timestamp(), None);
        assert_eq!(queue.total_length(), 110);

        // Spanning into the second segment drops its timestamp as well.
        queue.consume(70);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front_timestamp(), None);
        assert_eq!(queue.total_length(), 40);
    }

    #[test]
    fn consume_beyond_total_empties_queue() {
        let mut queue = TimestampQueue::default();
        queue.push_segment(None, 10);
        queue.push_segment(Some(5), 0);
        assert_eq!(queue.len(), 1);

        queue.consume(25);
        assert!(queue.is_empty());
        assert_eq!(queue.front_timestamp(), None);
    }
}
