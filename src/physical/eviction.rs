//! Ordered-prefix eviction
//!
//! When a leading subset of the grouping columns arrives sorted, a change in
//! that prefix means no later row can belong to any group with the old
//! prefix. Those groups can be finalized and released right away, so only
//! the groups sharing the current prefix value stay live.

use crate::types::Datum;

/// Tracks the last ordered-prefix value seen by the run loop
#[derive(Debug, Clone, Default)]
pub struct OrderedPrefixTracker {
    prefix_len: usize,
    last_prefix: Option<Vec<Datum>>,
}

impl OrderedPrefixTracker {
    /// A tracker over the first `prefix_len` key components. A length of
    /// zero disables eviction: every bucket lives until the input ends.
    pub fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len,
            last_prefix: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prefix_len > 0
    }

    pub fn last_prefix(&self) -> Option<&[Datum]> {
        self.last_prefix.as_deref()
    }

    /// Observe the key of the next row. Returns the previous prefix value
    /// when the prefix has advanced; every bucket under it is now complete.
    pub fn observe(&mut self, key: &[Datum]) -> Option<Vec<Datum>> {
        if !self.is_enabled() {
            return None;
        }
        let prefix = &key[..self.prefix_len.min(key.len())];
        match &mut self.last_prefix {
            Some(last) if last.as_slice() == prefix => None,
            Some(last) => Some(std::mem::replace(last, prefix.to_vec())),
            None => {
                self.last_prefix = Some(prefix.to_vec());
                None
            }
        }
    }

    /// Forget the current prefix, returning it. Used when draining.
    pub fn take(&mut self) -> Option<Vec<Datum>> {
        self.last_prefix.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(values: &[i64]) -> Vec<Datum> {
        values.iter().map(|&v| Datum::Int(v)).collect()
    }

    #[test]
    fn test_disabled_never_evicts() {
        let mut tracker = OrderedPrefixTracker::new(0);
        assert!(tracker.observe(&key(&[1])).is_none());
        assert!(tracker.observe(&key(&[2])).is_none());
        assert!(tracker.last_prefix().is_none());
    }

    #[test]
    fn test_prefix_advance() {
        let mut tracker = OrderedPrefixTracker::new(1);
        assert!(tracker.observe(&key(&[1, 5])).is_none());
        assert!(tracker.observe(&key(&[1, 6])).is_none());
        assert_eq!(tracker.observe(&key(&[2, 5])), Some(key(&[1])));
        assert_eq!(tracker.last_prefix(), Some(key(&[2]).as_slice()));
        assert!(tracker.observe(&key(&[2, 9])).is_none());
        assert_eq!(tracker.take(), Some(key(&[2])));
    }

    #[test]
    fn test_null_prefix_values() {
        let mut tracker = OrderedPrefixTracker::new(1);
        assert!(tracker.observe(&[Datum::Null, Datum::Int(1)]).is_none());
        assert!(tracker.observe(&[Datum::Null, Datum::Int(2)]).is_none());
        assert_eq!(tracker.observe(&[Datum::Int(0), Datum::Int(1)]), Some(vec![Datum::Null]));
    }
}
