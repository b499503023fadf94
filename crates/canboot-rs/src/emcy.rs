//! Bounded per-node EMCY diagnostics storage.
//!
//! Every EMCY telegram a node emits is recorded until the stack is full;
//! further records are discarded rather than displacing older ones, so the
//! first faults after power-up are always retained. A node signalling
//! "no active error" (all-zero EMCY) clears its stack.

use crate::types::C_MAX_NODE_ERRORS;
use alloc::vec::Vec;

/// One recorded emergency telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmcyRecord {
    /// Emergency error code.
    pub code: u16,
    /// Error register (object 0x1001) snapshot.
    pub register: u8,
    /// Manufacturer-specific diagnostic bytes.
    pub specific: [u8; 5],
}

/// Append-only error stack for a single node, capped at
/// [`C_MAX_NODE_ERRORS`] records.
#[derive(Debug, Clone, Default)]
pub struct ErrorStack {
    records: Vec<EmcyRecord>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Returns false (and drops the record) when full.
    pub fn push(&mut self, record: EmcyRecord) -> bool {
        if self.records.len() >= C_MAX_NODE_ERRORS {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Forgets every recorded error.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EmcyRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: u16) -> EmcyRecord {
        EmcyRecord {
            code,
            register: 0x01,
            specific: [0xDE, 0xAD, 0xBE, 0xEF, 0x00],
        }
    }

    #[test]
    fn test_overflow_discards_new_entries() {
        let mut stack = ErrorStack::new();
        for i in 0..C_MAX_NODE_ERRORS {
            assert!(stack.push(record(i as u16)));
        }
        // The 33rd record is dropped, not the oldest.
        assert!(!stack.push(record(0xFFFF)));
        assert_eq!(stack.len(), C_MAX_NODE_ERRORS);
        assert_eq!(stack.iter().next().unwrap().code, 0);
        assert!(stack.iter().all(|r| r.code != 0xFFFF));
    }

    #[test]
    fn test_clear_resets_count() {
        let mut stack = ErrorStack::new();
        stack.push(record(0x8130));
        stack.push(record(0x2310));
        assert_eq!(stack.len(), 2);
        stack.clear();
        assert!(stack.is_empty());
        assert!(stack.push(record(0x1000)));
    }
}
