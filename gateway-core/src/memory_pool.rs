use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Process-wide pool of byte arrays, bucketed by (rounded-up) requested size.
///
/// Buckets remove the need to allocate fresh arrays on every high-frequency notification;
/// the actual buffer length handed back may exceed the request, so callers track the
/// valid length separately (see [`PooledHandle::valid_len`]).
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<Inner>,
}

struct Inner {
    buckets: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    max_per_bucket: usize,
    total_rentals: AtomicU64,
    total_returns: AtomicU64,
}

/// Rental/return counters, sampled for diagnostics; not used to gate behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total_rentals: u64,
    pub total_returns: u64,
}

impl MemoryPool {
    /// `max_per_bucket` bounds how many idle buffers of a given size are kept around;
    /// beyond that, returned buffers are dropped silently rather than retained forever.
    pub fn new(max_per_bucket: usize) -> Self {
        MemoryPool {
            inner: Arc::new(Inner {
                buckets: Mutex::new(HashMap::new()),
                max_per_bucket,
                total_rentals: AtomicU64::new(0),
                total_returns: AtomicU64::new(0),
            }),
        }
    }

    fn bucket_size(min_len: usize) -> usize {
        // Round up to the next power-of-two-ish bucket so a handful of common sizes
        // (notification payloads, 1024-byte log batches) get reused instead of each
        // rental minting a slightly different capacity.
        min_len.next_power_of_two().max(64)
    }

    /// Rents an array whose length is >= `min_len`, zero-filled for the caller's use.
    pub fn rent(&self, min_len: usize) -> PooledHandle {
        let bucket = Self::bucket_size(min_len);
        self.inner.total_rentals.fetch_add(1, Ordering::Relaxed);

        let array = {
            let mut buckets = self.inner.buckets.lock().unwrap();
            buckets.get_mut(&bucket).and_then(|v| v.pop())
        };
        let mut array = array.unwrap_or_else(|| vec![0u8; bucket]);
        if array.len() < min_len {
            array.resize(bucket, 0);
        }
        for b in array.iter_mut() {
            *b = 0;
        }

        PooledHandle { pool: self.clone(), array: Some(array), valid_len: min_len, bucket }
    }

    /// Returns an array to its bucket, or drops it if the bucket is already full.
    /// Idempotent at the handle level: see [`PooledHandle::drop`].
    fn give_back(&self, bucket: usize, mut array: Vec<u8>) {
        self.inner.total_returns.fetch_add(1, Ordering::Relaxed);
        for b in array.iter_mut() {
            *b = 0;
        }
        let mut buckets = self.inner.buckets.lock().unwrap();
        let slot = buckets.entry(bucket).or_default();
        if slot.len() < self.inner.max_per_bucket {
            slot.push(array);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_rentals: self.inner.total_rentals.load(Ordering::Relaxed),
            total_returns: self.inner.total_returns.load(Ordering::Relaxed),
        }
    }
}

/// A rented byte array with a `valid_len` cursor; returns itself to the pool on drop.
///
/// Double-return is impossible by construction (the array is `take`n on first return),
/// matching the spec's requirement that misuse be defensively ignored rather than panic.
pub struct PooledHandle {
    pool: MemoryPool,
    array: Option<Vec<u8>>,
    valid_len: usize,
    bucket: usize,
}

impl PooledHandle {
    pub fn as_slice(&self) -> &[u8] {
        &self.array.as_ref().expect("handle used after return")[..self.valid_len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.valid_len;
        &mut self.array.as_mut().expect("handle used after return")[..len]
    }

    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub fn set_valid_len(&mut self, len: usize) {
        self.valid_len = len;
    }

    /// Copies `bytes` into the start of the rented array and sets the valid length.
    pub fn fill(&mut self, bytes: &[u8]) {
        let array = self.array.as_mut().expect("handle used after return");
        if array.len() < bytes.len() {
            array.resize(bytes.len(), 0);
        }
        array[..bytes.len()].copy_from_slice(bytes);
        self.valid_len = bytes.len();
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        if let Some(array) = self.array.take() {
            self.pool.give_back(self.bucket, array);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_yields_array_at_least_as_long_as_requested() {
        let pool = MemoryPool::new(4);
        let handle = pool.rent(300);
        assert!(handle.as_slice().len() >= 300);
        assert_eq!(handle.valid_len(), 300);
    }

    #[test]
    fn returned_arrays_are_reused() {
        let pool = MemoryPool::new(4);
        {
            let _h = pool.rent(128);
        }
        let stats = pool.stats();
        assert_eq!(stats.total_rentals, 1);
        assert_eq!(stats.total_returns, 1);

        let h2 = pool.rent(128);
        assert_eq!(pool.stats().total_rentals, 2);
        drop(h2);
        assert_eq!(pool.stats().total_returns, 2);
    }

    #[test]
    fn full_bucket_drops_extra_returns_without_panicking() {
        let pool = MemoryPool::new(1);
        let h1 = pool.rent(64);
        let h2 = pool.rent(64);
        drop(h1);
        drop(h2);
        // second return silently dropped because max_per_bucket == 1; no panic either way
        assert_eq!(pool.stats().total_returns, 2);
    }

    #[test]
    fn fill_sets_valid_len_and_contents() {
        let pool = MemoryPool::new(4);
        let mut handle = pool.rent(8);
        handle.fill(&[1, 2, 3]);
        assert_eq!(handle.as_slice(), &[1, 2, 3]);
    }
}
