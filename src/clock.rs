//! Vector clocks used both as the client-visible causal-metadata token and as
//! the per-key ordering mechanism inside the store.
//!
//! Ticks are keyed by the record's own key (see DESIGN.md, "identity of a
//! vector-clock dimension"), not by node address.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A mapping from participant id to monotonically non-decreasing tick count.
///
/// Serializes as a plain JSON object (`{"x": 3}`), matching the wire format
/// clients already speak. `BTreeMap` gives stable iteration order, which
/// keeps serialized clocks deterministic and diffable in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    Ancestor,
    Descendant,
    Concurrent,
}

impl VectorClock {
    pub fn new() -> Self {
        VectorClock(BTreeMap::new())
    }

    /// Builds a clock from a client-supplied token, treating a missing token
    /// (`null`/absent causal-metadata) as the empty clock.
    pub fn from_option(clock: Option<VectorClock>) -> Self {
        clock.unwrap_or_default()
    }

    pub fn get(&self, participant: &str) -> u64 {
        *self.0.get(participant).unwrap_or(&0)
    }

    /// Increments the tick for `participant` by one and returns the new value.
    pub fn tick(&mut self, participant: &str) -> u64 {
        let entry = self.0.entry(participant.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Pointwise max merge, mutating `self` in place.
    pub fn merge(&mut self, other: &VectorClock) {
        for (participant, &tick) in other.0.iter() {
            let entry = self.0.entry(participant.clone()).or_insert(0);
            if tick > *entry {
                *entry = tick;
            }
        }
    }

    /// Returns a new clock that is the pointwise max of `self` and `other`,
    /// without mutating either.
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_ahead = false;
        let mut other_ahead = false;

        let mut participants: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        participants.sort_unstable();
        participants.dedup();

        for participant in participants {
            match self.get(participant).cmp(&other.get(participant)) {
                Ordering::Greater => self_ahead = true,
                Ordering::Less => other_ahead = true,
                Ordering::Equal => {}
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Descendant,
            (false, true) => ClockOrdering::Ancestor,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(map: BTreeMap<String, u64>) -> Self {
        VectorClock(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_starts_at_one() {
        let mut c = VectorClock::new();
        assert_eq!(c.tick("k"), 1);
        assert_eq!(c.tick("k"), 2);
        assert_eq!(c.get("k"), 2);
    }

    #[test]
    fn merge_is_pointwise_max() {
        let mut a = VectorClock::new();
        a.tick("k");
        a.tick("k");
        let mut b = VectorClock::new();
        b.tick("k");
        b.tick("k");
        b.tick("k");
        a.merge(&b);
        assert_eq!(a.get("k"), 3);
    }

    #[test]
    fn compare_detects_ancestor_descendant_concurrent_equal() {
        let mut a = VectorClock::new();
        a.tick("k");
        let mut b = a.clone();
        b.tick("k");

        assert_eq!(a.compare(&b), ClockOrdering::Ancestor);
        assert_eq!(b.compare(&a), ClockOrdering::Descendant);
        assert_eq!(a.compare(&a), ClockOrdering::Equal);

        let mut c = VectorClock::new();
        c.tick("j");
        assert_eq!(a.compare(&c), ClockOrdering::Concurrent);
    }

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let mut a = VectorClock::new();
        a.tick("x");
        a.tick("y");
        let mut b = VectorClock::new();
        b.tick("y");
        b.tick("y");
        b.tick("z");

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(ab, ba);

        let ab_again = ab.merged(&b);
        assert_eq!(ab, ab_again);
    }
}
