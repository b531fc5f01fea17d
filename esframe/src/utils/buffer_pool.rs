use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A thread-safe pool of output slots with a bounded number in flight.
///
/// Models the output side of the drive loop: a slot may be unavailable
/// right now (all slots handed out), and no slot is ever larger than
/// `max_slot_size`.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolState>>,
    max_slots: usize,
    max_slot_size: usize,
}

#[derive(Debug)]
struct PoolState {
    free: VecDeque<Vec<u8>>,
    outstanding: usize,
}

impl BufferPool {
    /// Creates a new pool.
    ///
    /// # Arguments
    ///
    /// * `max_slots` - Maximum number of slots handed out at the same time
    /// * `max_slot_size` - Largest slot size that can ever be acquired
    pub fn new(max_slots: usize, max_slot_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolState {
                free: VecDeque::with_capacity(max_slots),
                outstanding: 0,
            })),
            max_slots,
            max_slot_size,
        }
    }

    /// Acquires an empty slot able to hold `size` bytes.
    ///
    /// Returns `None` when `size` exceeds the slot size or when every slot is
    /// currently in use.
    pub fn try_acquire(&self, size: usize) -> Option<Vec<u8>> {
        if size > self.max_slot_size {
            return None;
        }

        let mut state = self.inner.lock().unwrap();
        if state.outstanding >= self.max_slots {
            return None;
        }
        state.outstanding += 1;

        let mut slot = state
            .free
            .pop_front()
            .unwrap_or_else(|| Vec::with_capacity(self.max_slot_size));
        slot.clear();
        slot.reserve(size);

        Some(slot)
    }

    /// Returns a slot to the pool.
    pub fn release(&self, mut slot: Vec<u8>) {
        slot.clear();

        let mut state = self.inner.lock().unwrap();
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.free.len() < self.max_slots {
            state.free.push_back(slot);
        }
    }

    pub fn in_use(&self) -> usize {
        self.inner.lock().unwrap().outstanding
    }

    pub fn max_slot_size(&self) -> usize {
        self.max_slot_size
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16, 64 * 1024)
    }
}

#[test]
fn pool_limits_slots_in_flight() {
    let pool = BufferPool::new(2, 1024);

    let a = pool.try_acquire(100).unwrap();
    let _b = pool.try_acquire(1024).unwrap();
    assert!(pool.try_acquire(10).is_none());
    assert_eq!(pool.in_use(), 2);

    pool.release(a);
    assert_eq!(pool.in_use(), 1);
    assert!(pool.try_acquire(2048).is_none());

    let c = pool.try_acquire(512).unwrap();
    assert!(c.is_empty());
    assert!(c.capacity() >= 512);
}
