//! Translation lookaside buffer
//!
//! Refreshed on every table walk. Entries are evicted oldest-first once
//! the buffer is full, and the whole buffer is flushed on a context switch.

use core_types::FrameId;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub page: u32,
    pub frame: FrameId,
}

#[derive(Debug)]
pub struct Tlb {
    capacity: usize,
    entries: VecDeque<TlbEntry>,
}

impl Tlb {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn lookup(&self, page: u32) -> Option<FrameId> {
        self.entries
            .iter()
            .find(|entry| entry.page == page)
            .map(|entry| entry.frame)
    }

    /// Records the translation of `page`, replacing any older one
    pub fn update(&mut self, page: u32, frame: FrameId) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|entry| entry.page != page);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TlbEntry { page, frame });
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_lookup() {
        let mut tlb = Tlb::new(2);
        tlb.update(3, FrameId::new(7));
        assert_eq!(tlb.lookup(3), Some(FrameId::new(7)));
        assert_eq!(tlb.lookup(4), None);
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut tlb = Tlb::new(2);
        tlb.update(1, FrameId::new(1));
        tlb.update(2, FrameId::new(2));
        tlb.update(1, FrameId::new(5));
        tlb.update(3, FrameId::new(3));

        assert_eq!(tlb.len(), 2);
        assert_eq!(tlb.lookup(2), None);
        assert_eq!(tlb.lookup(1), Some(FrameId::new(5)));
    }

    #[test]
    fn test_flush_and_zero_capacity() {
        let mut tlb = Tlb::new(1);
        tlb.update(1, FrameId::new(1));
        tlb.flush();
        assert!(tlb.is_empty());

        let mut disabled = Tlb::new(0);
        disabled.update(1, FrameId::new(1));
        assert!(disabled.is_empty());
    }
}
