//! The `Record` type stored per key, and the size limits and conflict
//! resolution rule shared by local writes and gossip merges.

use crate::clock::{ClockOrdering, VectorClock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum key length, in bytes.
pub const MAX_KEY_LEN: usize = 2048;
/// Maximum value length, in bytes.
pub const MAX_VALUE_LEN: usize = 8_000_000;

/// A versioned store entry. An empty `value` denotes a tombstone; the
/// record's `clock`/`version` survive a delete (I3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
    pub clock: VectorClock,
    pub version: u64,
    /// Milliseconds since the Unix epoch at last local mutation. Tie-breaker
    /// only, consulted only when two records are at equal `version` with
    /// `Equal` or `Concurrent` clocks (see `resolve`).
    pub time: u64,
}

impl Record {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    pub fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Ticks this record's clock at its own key, per the "per-key dimension"
    /// decision in DESIGN.md, and keeps `version` in lockstep (I1).
    pub fn tick(&mut self) {
        self.version = self.clock.tick(&self.key);
    }
}

pub fn key_len_ok(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN
}

pub fn value_len_ok(value: &str) -> bool {
    value.len() <= MAX_VALUE_LEN
}

/// Picks the winner between a local record and an incoming one for the same
/// key, per the ordering in SPEC_FULL.md §4.2:
///
/// 1. Strictly greater `version` wins.
/// 2. Equal version: if one clock strictly descends the other, the
///    descendant wins (handles the rare case of a stale resend).
/// 3. Equal version, clocks `Equal` or `Concurrent`: later `time` wins.
///
/// Under the per-key clock dimension (§9 decision 1), two independent
/// writes to the same key both start from the empty clock and tick only
/// `key`, so two genuinely concurrent writes produce byte-identical
/// clocks at equal version — `compare` reports `Equal`, not `Concurrent`.
/// So `Equal` cannot be treated as "same record, keep local": it must
/// fall through to the same `time` tie-break as `Concurrent`, with a
/// final deterministic tie-break on `value` so that two replicas with
/// identical clock, version, and `time` (e.g. re-merging a record with
/// itself) still agree without favoring whichever side is "local".
pub fn resolve<'a>(local: &'a Record, incoming: &'a Record) -> Winner {
    match local.version.cmp(&incoming.version) {
        Ordering::Less => Winner::Incoming,
        Ordering::Greater => Winner::Local,
        Ordering::Equal => match local.clock.compare(&incoming.clock) {
            ClockOrdering::Descendant => Winner::Local,
            ClockOrdering::Ancestor => Winner::Incoming,
            ClockOrdering::Equal | ClockOrdering::Concurrent => {
                match incoming.time.cmp(&local.time) {
                    Ordering::Greater => Winner::Incoming,
                    Ordering::Less => Winner::Local,
                    Ordering::Equal => match incoming.value.cmp(&local.value) {
                        Ordering::Greater => Winner::Incoming,
                        _ => Winner::Local,
                    },
                }
            }
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Incoming,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(version: u64, clock: VectorClock, time: u64) -> Record {
        Record {
            key: "k".into(),
            value: "v".into(),
            clock,
            version,
            time,
        }
    }

    #[test]
    fn higher_version_always_wins() {
        let mut c1 = VectorClock::new();
        c1.tick("k");
        let mut c2 = c1.clone();
        c2.tick("k");

        let local = rec(1, c1, 100);
        let incoming = rec(2, c2, 0);
        assert_eq!(resolve(&local, &incoming), Winner::Incoming);
    }

    #[test]
    fn equal_clocks_at_equal_version_fall_through_to_time_not_local() {
        // The realistic concurrent-write case under the per-key clock
        // dimension: two independent writes from an empty clock each tick
        // only `key`, producing byte-identical clocks at equal version.
        // `compare` reports `Equal`, but this must still resolve by `time`
        // rather than defaulting to `Local` (which would be node-relative
        // and would never let two replicas converge).
        let mut a = VectorClock::new();
        a.tick("k");
        let b = a.clone();

        let local = rec(1, a, 10);
        let incoming = rec(1, b.clone(), 20);
        assert_eq!(resolve(&local, &incoming), Winner::Incoming);

        let local2 = rec(1, local.clock.clone(), 30);
        let incoming2 = rec(1, b, 20);
        assert_eq!(resolve(&local2, &incoming2), Winner::Local);
    }

    #[test]
    fn concurrent_clocks_at_equal_version_later_time_wins() {
        let mut a = VectorClock::new();
        a.tick("k");
        let mut b = VectorClock::new();
        b.tick("other-participant");
        b.tick("k");

        let local = rec(1, a, 10);
        let incoming = rec(1, b, 20);
        assert_eq!(resolve(&local, &incoming), Winner::Incoming);
    }

    #[test]
    fn equal_clock_version_and_time_breaks_tie_on_value_deterministically() {
        // Same clock, version, and time (e.g. a record merged with an exact
        // duplicate of itself from another replica): the winner must be
        // determined by `value` alone, regardless of which side is "local",
        // so both replicas converge on the same record either way.
        let mut c = VectorClock::new();
        c.tick("k");

        let mut a = rec(1, c.clone(), 10);
        let mut b = rec(1, c, 10);
        a.value = "a".into();
        b.value = "b".into();

        assert_eq!(resolve(&a, &b), Winner::Incoming); // b wins: "b" > "a"
        assert_eq!(resolve(&b, &a), Winner::Local); // b (now local) still wins
    }

    #[test]
    fn merge_is_idempotent() {
        let mut c = VectorClock::new();
        c.tick("k");
        let r = rec(1, c, 5);
        assert_eq!(resolve(&r, &r.clone()), Winner::Local);
    }
}
