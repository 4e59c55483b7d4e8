//! In-memory key -> Record map plus the anti-entropy merge primitive.

use crate::clock::VectorClock;
use crate::record::{key_len_ok, resolve, value_len_ok, Record, Winner};
use crate::view::View;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    BadRequest,
}

/// `local_get` result.
pub enum GetOutcome {
    Found { value: String, clock: VectorClock },
    NotFound,
}

/// A shard's worth of records, keyed by key, with an insertion-order witness
/// for stable iteration in `GET /kvs/data` and in gossip snapshots.
#[derive(Debug, Default)]
pub struct Store {
    records: HashMap<String, Record>,
    insertion_order: Vec<String>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            records: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    pub fn local_get(&self, key: &str) -> GetOutcome {
        match self.records.get(key) {
            Some(record) if !record.is_tombstone() => GetOutcome::Found {
                value: record.value.clone(),
                clock: record.clock.clone(),
            },
            _ => GetOutcome::NotFound,
        }
    }

    /// Creates or updates `key`. Returns the merged-and-ticked clock, or
    /// `BadRequest` if the size limits (§3) are violated.
    pub fn local_put(
        &mut self,
        key: &str,
        new_value: String,
        client_clock: VectorClock,
    ) -> Result<(VectorClock, bool), StoreError> {
        if !key_len_ok(key) || !value_len_ok(&new_value) {
            return Err(StoreError::BadRequest);
        }

        let created = !self.records.contains_key(key);
        if created {
            self.insertion_order.push(key.to_string());
            self.records.insert(
                key.to_string(),
                Record {
                    key: key.to_string(),
                    value: String::new(),
                    clock: VectorClock::new(),
                    version: 0,
                    time: 0,
                },
            );
        }
        let record = self.records.get_mut(key).expect("just inserted or present");

        record.clock.merge(&client_clock);
        record.tick();
        record.value = new_value;
        record.time = Record::now_millis();

        Ok((record.clock.clone(), created))
    }

    /// Tombstones `key`. Returns `NotFound` for an absent key or an
    /// already-deleted one (deletes are logical, so a second delete is a
    /// no-op from the client's point of view). Merges `client_clock` first,
    /// the same as `local_put`, so a delete observes everything the client
    /// has already acknowledged.
    pub fn local_delete(&mut self, key: &str, client_clock: VectorClock) -> Result<VectorClock, ()> {
        match self.records.get_mut(key) {
            Some(record) if !record.is_tombstone() => {
                record.clock.merge(&client_clock);
                record.value.clear();
                record.tick();
                record.time = Record::now_millis();
                Ok(record.clock.clone())
            }
            _ => Err(()),
        }
    }

    /// Read-only snapshot of every record (including tombstones), in
    /// insertion order, for gossip fan-out.
    pub fn snapshot(&self) -> Vec<Record> {
        self.insertion_order
            .iter()
            .filter_map(|key| self.records.get(key).cloned())
            .collect()
    }

    /// Applies incoming records from a gossip peer or a hand-off, keeping
    /// the §4.2 winner for each key. Idempotent, commutative, and
    /// associative by construction since `resolve` is a total order.
    ///
    /// Enforces the key/value size limits (I4) on every incoming record,
    /// same as `local_put`: a misbehaving or stale peer must not be able to
    /// install an oversize record via gossip just because it skipped its
    /// own validation.
    pub fn merge(&mut self, incoming: Vec<Record>) {
        for record in incoming {
            if !key_len_ok(&record.key) || !value_len_ok(&record.value) {
                continue;
            }
            match self.records.get(&record.key) {
                None => {
                    self.insertion_order.push(record.key.clone());
                    self.records.insert(record.key.clone(), record);
                }
                Some(local) => {
                    if resolve(local, &record) == Winner::Incoming {
                        self.records.insert(record.key.clone(), record);
                    }
                }
            }
        }
    }

    /// Recomputes ownership under `new_view` and evicts keys that no longer
    /// map to `self_shard`. Returns the evicted records so the caller can
    /// hand them off to their new owning shard before they are gone for
    /// good (DESIGN.md, "hand-off on resharding").
    pub fn reshape(&mut self, new_view: &View, self_shard: Option<usize>) -> Vec<Record> {
        let Some(self_shard) = self_shard else {
            // Node left the view entirely; nothing is ours anymore.
            let evicted: Vec<Record> = self.records.drain().map(|(_, r)| r).collect();
            self.insertion_order.clear();
            return evicted;
        };

        let mut evicted = Vec::new();
        let mut retained_order = Vec::with_capacity(self.insertion_order.len());

        for key in self.insertion_order.drain(..).collect::<Vec<_>>() {
            let owned = crate::placement::shard_for_key(
                &key,
                new_view.nodes.len(),
                new_view.shard_count,
            )
            .map(|shard| shard == self_shard)
            .unwrap_or(false);

            if owned {
                retained_order.push(key);
            } else if let Some(record) = self.records.remove(&key) {
                evicted.push(record);
            }
        }

        self.insertion_order = retained_order;
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
