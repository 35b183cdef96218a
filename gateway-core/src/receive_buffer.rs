use std::sync::Mutex;

use consts::LARGE_APPEND_THRESHOLD;

use crate::memory_pool::{MemoryPool, PooledHandle};

/// Thread-safe append-and-drain byte buffer backing a [`crate::session::DeviceSession`].
///
/// All operations serialize through one mutex; `drain` is O(n) and yields-and-clears
/// atomically so a concurrent `len()` can never observe a length that a subsequent
/// `drain()` then fails to fully account for.
pub struct ReceiveBuffer {
    pool: MemoryPool,
    inner: Mutex<Vec<u8>>,
}

impl ReceiveBuffer {
    pub fn new(pool: MemoryPool) -> Self {
        ReceiveBuffer { pool, inner: Mutex::new(Vec::new()) }
    }

    /// Appends `bytes`, or does nothing if empty. Stages through the memory pool for
    /// large payloads (see [`Self::append_large`]) to amortise allocation.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if bytes.len() > LARGE_APPEND_THRESHOLD {
            self.append_large(bytes);
            return;
        }
        self.inner.lock().unwrap().extend_from_slice(bytes);
    }

    /// Same as [`Self::append`] but rents a pool buffer as a staging copy first; used
    /// by callers (and automatically by `append`) once a payload exceeds 512 bytes.
    pub fn append_large(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut staging = self.pool.rent(bytes.len());
        staging.fill(bytes);
        self.inner.lock().unwrap().extend_from_slice(staging.as_slice());
    }

    /// Drains the buffer, returning its prior contents and leaving it empty.
    pub fn drain(&self) -> Vec<u8> {
        let mut guard = self.inner.lock().unwrap();
        std::mem::take(&mut *guard)
    }

    /// Same as [`Self::drain`] but stages the result through a pooled buffer, avoiding
    /// an extra heap allocation on the hot path of a large log-batch read.
    pub fn drain_pooled(&self) -> PooledHandle {
        let mut guard = self.inner.lock().unwrap();
        let mut handle = self.pool.rent(guard.len());
        handle.fill(&guard);
        guard.clear();
        handle
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().unwrap().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ReceiveBuffer {
        ReceiveBuffer::new(MemoryPool::new(4))
    }

    #[test]
    fn empty_append_is_noop() {
        let buf = buffer();
        buf.append(&[]);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn append_then_drain_is_contiguous() {
        let buf = buffer();
        buf.append(b"abc");
        buf.append(b"def");
        assert_eq!(buf.len(), 6);
        let drained = buf.drain();
        assert_eq!(drained, b"abcdef");
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn large_append_goes_through_the_pool_but_is_still_contiguous() {
        let buf = buffer();
        let big = vec![7u8; LARGE_APPEND_THRESHOLD + 50];
        buf.append(&big);
        assert_eq!(buf.len() as usize, big.len());
        assert_eq!(buf.drain(), big);
    }

    #[test]
    fn drain_pooled_clears_and_preserves_contents() {
        let buf = buffer();
        buf.append(b"hello");
        let handle = buf.drain_pooled();
        assert_eq!(handle.as_slice(), b"hello");
        assert_eq!(buf.len(), 0);
    }
}
