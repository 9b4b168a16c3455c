//! Size-bucketed reuse pool for fixed-size plane buffers.
//!
//! Steady-state pipelines allocate the same buffer sizes over and over. The
//! pool keeps released blocks in buckets keyed by their exact size and hands
//! them back out on the next `acquire` of that size. Blocks are returned by
//! dropping their [`PoolBlock`] handle, never freed directly.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Default cap on idle blocks kept per size bucket.
pub const DEFAULT_MAX_FREE_PER_BUCKET: usize = 16;

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks freshly allocated by the pool.
    pub allocated: u64,
    /// Acquisitions served from a free bucket.
    pub reused: u64,
    /// Blocks returned to a bucket.
    pub returned: u64,
    /// Blocks dropped on return because their bucket was full.
    pub discarded: u64,
    /// Blocks currently idle across all buckets.
    pub free: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    buckets: HashMap<usize, Vec<Box<[u8]>>>,
    stats: PoolStats,
}

#[derive(Debug)]
struct PoolShared {
    inner: Mutex<PoolInner>,
    max_free_per_bucket: usize,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, data: Box<[u8]>) {
        let mut inner = self.lock();
        let bucket = inner.buckets.entry(data.len()).or_default();
        if bucket.len() < self.max_free_per_bucket {
            bucket.push(data);
            inner.stats.returned += 1;
            inner.stats.free += 1;
        } else {
            inner.stats.discarded += 1;
        }
    }
}

/// Pool of reusable byte blocks. Cheap to clone; clones share buckets.
#[derive(Debug, Clone)]
pub struct FixedMemoryPool {
    shared: Arc<PoolShared>,
}

impl FixedMemoryPool {
    pub fn new() -> Self {
        Self::with_max_free(DEFAULT_MAX_FREE_PER_BUCKET)
    }

    pub fn with_max_free(max_free_per_bucket: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                inner: Mutex::new(PoolInner::default()),
                max_free_per_bucket,
            }),
        }
    }

    /// The process-wide pool used by frames created with `fixed = true`.
    pub fn global() -> &'static FixedMemoryPool {
        static GLOBAL: OnceLock<FixedMemoryPool> = OnceLock::new();
        GLOBAL.get_or_init(FixedMemoryPool::new)
    }

    /// Get a block of exactly `size` bytes. Reused blocks keep stale content.
    pub fn acquire(&self, size: usize) -> PoolBlock {
        let recycled = {
            let mut inner = self.shared.lock();
            let block = inner.buckets.get_mut(&size).and_then(|b| b.pop());
            if block.is_some() {
                inner.stats.reused += 1;
                inner.stats.free -= 1;
            } else {
                inner.stats.allocated += 1;
            }
            block
        };
        // Allocate outside the lock.
        let data = recycled.unwrap_or_else(|| vec![0u8; size].into_boxed_slice());
        PoolBlock {
            data: Some(data),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Return a block explicitly. Equivalent to dropping it.
    pub fn release(&self, block: PoolBlock) {
        drop(block);
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }

    /// Drop every idle block.
    pub fn clear(&self) {
        let mut inner = self.shared.lock();
        inner.buckets.clear();
        inner.stats.free = 0;
    }
}

impl Default for FixedMemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A block borrowed from a [`FixedMemoryPool`]; returns itself on drop.
pub struct PoolBlock {
    data: Option<Box<[u8]>>,
    pool: Arc<PoolShared>,
}

impl PoolBlock {
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pool this block goes back to.
    pub fn pool(&self) -> FixedMemoryPool {
        FixedMemoryPool {
            shared: Arc::clone(&self.pool),
        }
    }
}

impl Deref for PoolBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PoolBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

impl std::fmt::Debug for PoolBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBlock").field("len", &self.len()).finish()
    }
}
