/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Bounded pool of encoder scratch buffers.
//!
//! Acquiring from an empty pool allocates; releasing into a full pool drops
//! the buffer. Neither operation blocks.

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of pooled buffers.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Default capacity of a freshly allocated buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 512;

/// Lock-free free-list of `BytesMut` buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: ArrayQueue<BytesMut>,
    buffer_capacity: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

/// Counters describing pool behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Buffers created because the pool was empty.
    pub allocated: u64,
    /// Buffers served from the free-list.
    pub reused: u64,
    /// Buffers dropped because the pool was full.
    pub discarded: u64,
}

impl BufferPool {
    /// Creates a pool holding at most `capacity` idle buffers.
    #[must_use]
    pub fn new(capacity: usize, buffer_capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
            buffer_capacity,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Takes a cleared buffer, allocating if none is idle.
    pub fn acquire(&self) -> BytesMut {
        match self.free.pop() {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Returns a buffer to the pool, dropping it if the pool is full.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if self.free.push(buf).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the number of idle buffers.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_allocate_on_empty() {
        let pool = BufferPool::new(2, 128);
        let buf = pool.acquire();
        assert!(buf.capacity() >= 128);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_reuse_and_clear() {
        let pool = BufferPool::new(2, 128);
        let mut buf = pool.acquire();
        buf.put_slice(b"dirty");
        pool.release(buf);
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_discard_on_full() {
        let pool = BufferPool::new(1, 16);
        pool.release(BytesMut::new());
        pool.release(BytesMut::new());
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().discarded, 1);
    }
}
