//! Shared byte buffers backing one contiguous address range.

use std::sync::{Arc, RwLock};

/// Current and previous byte snapshots for one contiguous range. Shared by
/// every [`Region`](crate::snapshot::Region) covering (part of) the range so
/// overlapping regions are read once. Mutated only by the value collector;
/// read-only to every other consumer.
#[derive(Debug)]
pub struct ReadGroup {
    base: u64,
    size: usize,
    current: Vec<u8>,
    previous: Vec<u8>,
    has_current: bool,
    has_previous: bool,
}

pub type SharedReadGroup = Arc<RwLock<ReadGroup>>;

impl ReadGroup {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            size,
            current: vec![0u8; size],
            previous: Vec::new(),
            has_current: false,
            has_previous: false,
        }
    }

    pub fn shared(base: u64, size: usize) -> SharedReadGroup {
        Arc::new(RwLock::new(Self::new(base, size)))
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.size as u64
    }

    /// Install freshly read bytes, rotating the old current bytes into the
    /// previous slot. Previous values exist only after at least two reads.
    ///
    /// Invariant: `bytes.len() == self.size()`.
    pub fn update(&mut self, bytes: Vec<u8>) {
        debug_assert_eq!(bytes.len(), self.size);
        if self.has_current {
            self.previous = std::mem::replace(&mut self.current, bytes);
            self.has_previous = true;
        } else {
            self.current = bytes;
            self.has_current = true;
        }
    }

    /// Record a failed read; the group's regions contribute no matches until
    /// the next successful collection.
    pub fn mark_unread(&mut self) {
        self.has_current = false;
    }

    #[inline]
    pub fn has_current(&self) -> bool {
        self.has_current
    }

    #[inline]
    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    #[inline]
    pub fn current(&self) -> Option<&[u8]> {
        self.has_current.then_some(self.current.as_slice())
    }

    #[inline]
    pub fn previous(&self) -> Option<&[u8]> {
        self.has_previous.then_some(self.previous.as_slice())
    }

    /// Seed current bytes directly (tests and the pointer engine's
    /// one-element target snapshots).
    pub fn set_current(&mut self, bytes: Vec<u8>) {
        debug_assert_eq!(bytes.len(), self.size);
        self.current = bytes;
        self.has_current = true;
    }
}
