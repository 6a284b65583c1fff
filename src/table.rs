//! Concurrency-safe label -> resource table.
//!
//! One map per [`ResourceKind`], each behind its own lock, so operations on
//! different kinds never contend. Every label maps to a slot that is either
//! empty (reserved, creation possibly in flight) or holds exactly one
//! [`ResourceRecord`] for the rest of the run.
//!
//! Locks are only held for in-memory lookups and inserts. Provider calls
//! happen outside of them, while the slot itself serialises creators of the
//! same label.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::OnceCell;

use crate::types::{ResourceKind, ResourceRecord, REMOVED, STATELESS};

/// A reserved label; filled once the resource exists.
pub(crate) type Slot = Arc<OnceCell<ResourceRecord>>;

/// Maps labels to provider identifiers, per resource kind.
///
/// Labels are kept in insertion order, which makes "first discovered"
/// well-defined for [`STATELESS`] lookups.
#[derive(Debug)]
pub struct LabeledResourceTable {
    kinds: [Mutex<IndexMap<String, Slot>>; ResourceKind::COUNT],
}

impl Default for LabeledResourceTable {
    fn default() -> Self {
        Self {
            kinds: std::array::from_fn(|_| Mutex::new(IndexMap::new())),
        }
    }
}

impl LabeledResourceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier recorded under `label`.
    ///
    /// For [`STATELESS`] this returns any recorded resource of the kind,
    /// preferring the first one discovered in the account.
    pub fn get(&self, kind: ResourceKind, label: &str) -> Option<String> {
        if label == STATELESS {
            return self
                .stateless_candidates(kind)
                .into_iter()
                .next()
                .map(|record| record.provider_id);
        }

        let map = self.kinds[kind.index()].lock();
        map.get(label)
            .and_then(|slot| slot.get())
            .map(|record| record.provider_id.clone())
    }

    /// Atomically reserves a free label.
    ///
    /// Returns `label` unchanged if nothing is recorded or reserved under it,
    /// otherwise `label` with random digits appended until the result is free.
    /// [`STATELESS`] is never handed out.
    pub fn reserve_label(&self, kind: ResourceKind, label: &str) -> String {
        let mut map = self.kinds[kind.index()].lock();
        let mut rng = rand::thread_rng();

        let mut candidate = label.to_string();
        while candidate == STATELESS || map.contains_key(&candidate) {
            candidate.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }

        map.insert(candidate.clone(), Arc::new(OnceCell::new()));
        candidate
    }

    /// Records a resource under `label`.
    ///
    /// Returns `false`, leaving the table unchanged, if the label already
    /// holds a record or is being filled by a concurrent creator.
    pub fn put(&self, kind: ResourceKind, label: &str, id: &str, pool_origin: bool) -> bool {
        let slot = self.claim(kind, label);
        let filled = slot
            .set(ResourceRecord {
                kind,
                label: label.to_string(),
                provider_id: id.to_string(),
                pool_origin,
            })
            .is_ok();
        if !filled {
            log::debug!("{kind} label '{label}' already holds a record, not replacing it");
        }
        filled
    }

    /// Returns a snapshot of every record of a kind, in insertion order.
    ///
    /// Reserved labels that have not been filled yet are skipped.
    pub fn all_entries(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        let map = self.kinds[kind.index()].lock();
        map.values().filter_map(|slot| slot.get().cloned()).collect()
    }

    /// Returns the records eligible for a [`STATELESS`] lookup.
    ///
    /// Records discovered in the account come first, then records created
    /// during the run. Records labelled [`REMOVED`] are never eligible.
    pub fn stateless_candidates(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        let (mut pool, created): (Vec<_>, Vec<_>) = self
            .all_entries(kind)
            .into_iter()
            .filter(|record| !record.label.starts_with(REMOVED))
            .partition(|record| record.pool_origin);
        pool.extend(created);
        pool
    }

    /// Number of records across all kinds.
    pub fn len(&self) -> usize {
        self.kinds
            .iter()
            .map(|map| map.lock().values().filter(|slot| slot.initialized()).count())
            .sum()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the slot for `label`, reserving it if needed.
    pub(crate) fn claim(&self, kind: ResourceKind, label: &str) -> Slot {
        let mut map = self.kinds[kind.index()].lock();
        Arc::clone(
            map.entry(label.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Frees `label` again after filling `slot` failed.
    ///
    /// Nothing is removed if the label now maps to another slot, if the slot
    /// was filled meanwhile, or if another caller still holds it and may yet
    /// fill it. Returns `true` if the label was freed.
    pub(crate) fn release(&self, kind: ResourceKind, label: &str, slot: &Slot) -> bool {
        let mut map = self.kinds[kind.index()].lock();
        let vacant = map.get(label).is_some_and(|held| {
            // The map and `slot` itself are the only owners.
            Arc::ptr_eq(held, slot) && !held.initialized() && Arc::strong_count(held) == 2
        });
        if vacant {
            map.shift_remove(label);
        }
        vacant
    }

    /// Removes and returns every filled record of a kind.
    ///
    /// Slots still being filled stay in place.
    pub(crate) fn drain(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        let mut map = self.kinds[kind.index()].lock();
        let mut drained = Vec::new();
        map.retain(|_, slot| match slot.get() {
            Some(record) => {
                drained.push(record.clone());
                false
            }
            None => true,
        });
        drained
    }
}
