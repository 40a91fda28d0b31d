//! Fixed-capacity datagram buffer
//!
//! A `Buffer` is either owned by a `BufferPool` (tagged with the pool's id)
//! or transient. Ownership is moved in and out of the pool, so a buffer can
//! only ever be released once.

use std::num::NonZeroU64;

/// Fixed-capacity byte buffer
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    /// Number of valid bytes at the front of `data`
    len: usize,
    /// Owning pool, `None` for transient buffers
    origin: Option<NonZeroU64>,
}

impl Buffer {
    /// Allocate a buffer that does not belong to any pool
    pub fn transient(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            origin: None,
        }
    }

    /// Allocate a buffer tagged with a pool id
    pub(crate) fn pooled(capacity: usize, pool_id: NonZeroU64) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            origin: Some(pool_id),
        }
    }

    /// Total capacity in bytes
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid bytes
    #[inline(always)]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whole backing storage, for receiving into
    #[inline(always)]
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mark the first `len` bytes as valid (clamped to capacity)
    #[inline(always)]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    /// Zero the valid bytes and reset the length
    #[inline]
    pub fn clear(&mut self) {
        self.data[..self.len].fill(0);
        self.len = 0;
    }

    /// Id of the owning pool
    #[inline(always)]
    pub fn origin(&self) -> Option<NonZeroU64> {
        self.origin
    }

    /// Whether this buffer belongs to a pool
    #[inline(always)]
    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }
}
