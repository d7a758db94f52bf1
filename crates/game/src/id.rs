use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned identity of a simulated object. `0` is never handed out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UniqueId(pub u32);

impl UniqueId {
    pub const NONE: UniqueId = UniqueId(0);

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for UniqueId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone)]
pub struct UniqueIdAllocator {
    next: u32,
}

impl Default for UniqueIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns `None` once the id space is exhausted rather than wrapping onto live ids.
    pub fn allocate(&mut self) -> Option<UniqueId> {
        if self.next == 0 {
            return None;
        }
        let id = UniqueId(self.next);
        self.next = self.next.wrapping_add(1);
        Some(id)
    }

    /// Makes sure ids handed out later never collide with `id`.
    pub fn reserve_past(&mut self, id: UniqueId) {
        if id.0 >= self.next && self.next != 0 {
            self.next = id.0.wrapping_add(1);
        }
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}

pub type SnapshotId = u32;
pub type InputId = u32;
pub type Tick = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_skips_sentinel() {
        let mut alloc = UniqueIdAllocator::new();
        assert_eq!(alloc.allocate(), Some(UniqueId(1)));
        assert_eq!(alloc.allocate(), Some(UniqueId(2)));
        alloc.reserve_past(UniqueId(10));
        assert_eq!(alloc.allocate(), Some(UniqueId(11)));
    }

    #[test]
    fn allocator_refuses_to_wrap() {
        let mut alloc = UniqueIdAllocator { next: u32::MAX };
        assert_eq!(alloc.allocate(), Some(UniqueId(u32::MAX)));
        assert_eq!(alloc.allocate(), None);
    }
}
