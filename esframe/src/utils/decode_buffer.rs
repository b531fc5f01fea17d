/// Number of zeroed bytes kept behind the valid data.
///
/// Header scanners read a fixed lookahead past the last valid byte without
/// bounds checks; the padding makes those reads land on zeros.
pub const PAD: usize = 64;

/// Default capacity of a [`DecodeBuffer`], padding included.
pub const DEFAULT_CAPACITY: usize = 128 * 1024;

/// Fixed-capacity byte store for not yet consumed elementary-stream data.
///
/// Invariant: `size + PAD <= capacity` and bytes `[size, size + PAD)` are zero.
#[derive(Debug)]
pub struct DecodeBuffer {
    data: Box<[u8]>,
    size: usize,
}

impl Default for DecodeBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DecodeBuffer {
    /// Creates a buffer holding at most `capacity - PAD` bytes of data.
    ///
    /// Capacities smaller than `2 * PAD` are raised to that minimum.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2 * PAD);

        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
        }
    }

    /// Copies `bytes` to the tail. Returns `false` without touching the
    /// buffer if they do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free_space() {
            return false;
        }

        let end = self.size + bytes.len();
        self.data[self.size..end].copy_from_slice(bytes);
        self.size = end;
        self.zero_pad();

        true
    }

    /// Drops the first `n` bytes, moving the rest to offset 0.
    pub fn shrink(&mut self, n: usize) {
        if n >= self.size {
            self.reset();
            return;
        }

        self.data.copy_within(n..self.size, 0);
        self.size -= n;
        // Bytes past the new pad may be stale, only the pad has to be zero.
        self.zero_pad();
    }

    pub fn reset(&mut self) {
        self.size = 0;
        self.zero_pad();
    }

    #[inline(always)]
    pub fn free_space(&self) -> usize {
        self.data.len() - self.size - PAD
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Valid bytes.
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Valid bytes starting at `offset` followed by the zeroed pad.
    #[inline(always)]
    pub fn padded_from(&self, offset: usize) -> &[u8] {
        &self.data[offset.min(self.size)..self.size + PAD]
    }

    fn zero_pad(&mut self) {
        self.data[self.size..self.size + PAD].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_is_zero(buf: &DecodeBuffer) -> bool {
        buf.padded_from(buf.len())[..PAD].iter().all(|&b| b == 0)
    }

    #[test]
    fn append_rejects_without_partial_write() {
        let mut buf = DecodeBuffer::with_capacity(256);
        assert_eq!(buf.free_space(), 256 - PAD);

        assert!(buf.append(&[0xAA; 100]));
        let free = buf.free_space();
        assert_eq!(free, 256 - PAD - 100);

        assert!(!buf.append(&vec![0x55; free + 1]));
        assert_eq!(buf.len(), 100);
        assert!(buf.data().iter().all(|&b| b == 0xAA));
        assert!(pad_is_zero(&buf));

        assert!(buf.append(&vec![0x55; free]));
        assert_eq!(buf.free_space(), 0);
        assert!(pad_is_zero(&buf));
    }

    #[test]
    fn shrink_moves_tail_and_rezeros_pad() {
        let mut buf = DecodeBuffer::with_capacity(256);
        let bytes: Vec<u8> = (1..=120).collect();
        assert!(buf.append(&bytes));

        buf.shrink(20);
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.data(), &bytes[20..]);
        assert!(pad_is_zero(&buf));

        buf.shrink(0);
        assert_eq!(buf.data(), &bytes[20..]);

        buf.shrink(500);
        assert!(buf.is_empty());
        assert!(pad_is_zero(&buf));
    }

    #[test]
    fn tiny_capacity_is_raised() {
        let buf = DecodeBuffer::with_capacity(1);
        assert_eq!(buf.capacity(), 2 * PAD);
        assert_eq!(buf.free_space(), PAD);
    }
}
