use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::errors::{ServiceError, ServiceResult};
use crate::models::Record;

/// Where a locally held record stands relative to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Patched locally; a reconciliation is pending.
    LocalOptimistic,
    Reconciled,
    /// The reconciliation after a local patch failed; the patch is still shown.
    Stale,
}

struct Inner<T: Record> {
    records: Vec<T>,
    states: HashMap<T::Id, SyncState>,
    applied: u64,
}

impl<T: Record> Default for Inner<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            states: HashMap::new(),
            applied: 0,
        }
    }
}

/// Shared, ordered view of one backend collection.
///
/// Locks are only taken inside synchronous methods, so no guard ever lives across
/// an `.await`.
pub struct CollectionStore<T: Record> {
    name: Arc<str>,
    inner: Arc<RwLock<Inner<T>>>,
    busy: Arc<DashSet<T::Id>>,
    issued: Arc<AtomicU64>,
    provisional: Arc<AtomicI64>,
    revision: Arc<AtomicU64>,
}

impl<T: Record> Clone for CollectionStore<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
            busy: Arc::clone(&self.busy),
            issued: Arc::clone(&self.issued),
            provisional: Arc::clone(&self.provisional),
            revision: Arc::clone(&self.revision),
        }
    }
}

impl<T: Record> std::fmt::Debug for CollectionStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("issued", &self.latest_issued())
            .finish()
    }
}

impl<T: Record> CollectionStore<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            inner: Arc::new(RwLock::new(Inner::default())),
            busy: Arc::new(DashSet::new()),
            issued: Arc::new(AtomicU64::new(0)),
            provisional: Arc::new(AtomicI64::new(0)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // bumped while the write guard is held, so a reader never pairs old rows with a new revision
    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Changes on every write to the held rows.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.read().records.iter().find(|r| &r.id() == id).cloned()
    }

    pub fn first(&self) -> Option<T> {
        self.read().records.first().cloned()
    }

    pub fn state(&self, id: &T::Id) -> Option<SyncState> {
        self.read().states.get(id).copied()
    }

    /// Codes of every held record, in collection order.
    pub fn codes(&self) -> Vec<String> {
        self.read().records.iter().map(|r| r.code().to_string()).collect()
    }

    pub fn prepend(&self, record: T, state: SyncState) {
        let mut inner = self.write();
        let id = record.id();
        inner.records.retain(|r| r.id() != id);
        inner.records.insert(0, record);
        inner.states.insert(id, state);
        self.touch();
    }

    /// Replaces a record in place, keeping its position. Returns false when absent.
    pub fn replace(&self, record: T, state: SyncState) -> bool {
        let mut inner = self.write();
        let id = record.id();
        match inner.records.iter_mut().find(|r| r.id() == id) {
            Some(slot) => {
                *slot = record;
                inner.states.insert(id, state);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Overlays the fields present in `patch` onto the record with `id`.
    /// Returns `Ok(false)` when the record is not held locally.
    pub fn merge_patch<P: Serialize>(&self, id: &T::Id, patch: &P) -> ServiceResult<bool> {
        let current = match self.get(id) {
            Some(record) => record,
            None => return Ok(false),
        };
        let merged = shallow_merge(&current, patch)?;
        Ok(self.replace(merged, SyncState::LocalOptimistic))
    }

    pub fn remove(&self, id: &T::Id) -> Option<T> {
        let mut inner = self.write();
        let position = inner.records.iter().position(|r| &r.id() == id)?;
        inner.states.remove(id);
        let removed = inner.records.remove(position);
        self.touch();
        Some(removed)
    }

    /// Allocates a negative id for a record the backend has not numbered yet.
    pub fn next_provisional_id(&self) -> i64 {
        self.provisional.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Issues the next reconciliation sequence number for this collection.
    pub fn begin_sequence(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn is_latest(&self, sequence: u64) -> bool {
        sequence == self.latest_issued()
    }

    /// Wholesale replacement from a reconciliation tagged `sequence`. Responses to
    /// anything but the latest issued sequence are dropped and `false` is returned.
    pub fn apply_reconciliation(&self, sequence: u64, rows: Vec<T>) -> bool {
        let mut inner = self.write();
        // checked under the write lock so two responses cannot both win
        if sequence != self.latest_issued() || sequence <= inner.applied {
            return false;
        }
        inner.states = rows.iter().map(|r| (r.id(), SyncState::Reconciled)).collect();
        inner.records = rows;
        inner.applied = sequence;
        self.touch();
        true
    }

    /// Moves every record still waiting for reconciliation to `Stale`.
    pub fn mark_pending_stale(&self) -> usize {
        let mut inner = self.write();
        let mut marked = 0;
        for state in inner.states.values_mut() {
            if *state == SyncState::LocalOptimistic {
                *state = SyncState::Stale;
                marked += 1;
            }
        }
        marked
    }

    /// Claims `id` for a mutation. `Err(Busy)` while another mutation holds it; the
    /// claim is released when the guard drops.
    pub fn try_begin(&self, id: &T::Id) -> ServiceResult<BusyGuard<T>> {
        if !self.busy.insert(id.clone()) {
            return Err(ServiceError::Busy(id.to_string()));
        }
        Ok(BusyGuard {
            busy: Arc::clone(&self.busy),
            id: id.clone(),
        })
    }

    pub fn is_busy(&self, id: &T::Id) -> bool {
        self.busy.contains(id)
    }
}

pub struct BusyGuard<T: Record> {
    busy: Arc<DashSet<T::Id>>,
    id: T::Id,
}

impl<T: Record> BusyGuard<T> {
    pub fn id(&self) -> &T::Id {
        &self.id
    }
}

impl<T: Record> Drop for BusyGuard<T> {
    fn drop(&mut self) {
        self.busy.remove(&self.id);
    }
}

/// Serializes both sides and replaces top-level fields of `record` with those
/// present in `patch`. Nested objects are replaced, not merged.
pub fn shallow_merge<T: Record, P: Serialize>(record: &T, patch: &P) -> ServiceResult<T> {
    let mut base = serde_json::to_value(record)?;
    let overlay = serde_json::to_value(patch)?;
    match (&mut base, overlay) {
        (Value::Object(fields), Value::Object(changes)) => {
            for (key, value) in changes {
                fields.insert(key, value);
            }
        }
        (_, Value::Null) => {}
        (_, other) => {
            return Err(ServiceError::InternalError(format!(
                "patch must serialize to an object, got {}",
                other
            )))
        }
    }
    Ok(serde_json::from_value(base)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InventoryPatch, InventoryRecord};
    use rust_decimal_macros::dec;

    fn record(id: i64, code: &str) -> InventoryRecord {
        InventoryRecord {
            id,
            code: code.into(),
            lot: Some("L1".into()),
            acquired_quantity: dec!(10),
            existing_quantity: dec!(8),
            acquired_on: None,
            location: Some("Shelf A".into()),
            notes: None,
            name: Some("Acido".into()),
            description: None,
            image: None,
            low_stock: Some(false),
        }
    }

    #[test]
    fn merge_touches_only_patched_fields() {
        let store = CollectionStore::new("reagents/inventory");
        store.apply_reconciliation(store.begin_sequence(), vec![record(1, "R-001")]);

        let patch = InventoryPatch {
            existing_quantity: Some(dec!(5)),
            ..Default::default()
        };
        assert!(store.merge_patch(&1, &patch).unwrap());

        let merged = store.get(&1).unwrap();
        assert_eq!(merged.existing_quantity, dec!(5));
        assert_eq!(merged.location.as_deref(), Some("Shelf A"));
        assert_eq!(merged.name.as_deref(), Some("Acido"));
        assert_eq!(store.state(&1), Some(SyncState::LocalOptimistic));
    }

    #[test]
    fn merge_on_missing_record_is_noop() {
        let store: CollectionStore<InventoryRecord> = CollectionStore::new("x");
        assert!(!store.merge_patch(&9, &InventoryPatch::default()).unwrap());
    }

    #[test]
    fn only_latest_sequence_applies() {
        let store = CollectionStore::new("x");
        let first = store.begin_sequence();
        let second = store.begin_sequence();

        assert!(store.apply_reconciliation(second, vec![record(2, "R-002")]));
        assert!(!store.apply_reconciliation(first, vec![record(1, "R-001")]));
        assert_eq!(store.codes(), vec!["R-002".to_string()]);
    }

    #[test]
    fn busy_guard_releases_on_drop() {
        let store: CollectionStore<InventoryRecord> = CollectionStore::new("x");
        let guard = store.try_begin(&42).unwrap();
        assert!(matches!(store.try_begin(&42), Err(ServiceError::Busy(id)) if id == "42"));
        assert!(store.is_busy(guard.id()));
        drop(guard);
        assert!(store.try_begin(&42).is_ok());
    }

    #[test]
    fn provisional_ids_are_negative_and_unique() {
        let store: CollectionStore<InventoryRecord> = CollectionStore::new("x");
        assert_eq!(store.next_provisional_id(), -1);
        assert_eq!(store.next_provisional_id(), -2);
    }

    #[test]
    fn failed_reconciliation_marks_only_pending_records() {
        let store = CollectionStore::new("x");
        store.apply_reconciliation(store.begin_sequence(), vec![record(1, "R-001")]);
        store.prepend(record(-1, "R-002"), SyncState::LocalOptimistic);

        assert_eq!(store.mark_pending_stale(), 1);
        assert_eq!(store.state(&-1), Some(SyncState::Stale));
        assert_eq!(store.state(&1), Some(SyncState::Reconciled));
    }

    #[test]
    fn revision_moves_on_every_row_change() {
        let store = CollectionStore::new("x");
        let start = store.revision();
        store.apply_reconciliation(store.begin_sequence(), vec![record(1, "R-001")]);
        let loaded = store.revision();
        assert!(loaded > start);

        // a discarded reconciliation leaves the rows and the revision alone
        let stale = store.begin_sequence();
        store.begin_sequence();
        assert!(!store.apply_reconciliation(stale, vec![]));
        assert_eq!(store.revision(), loaded);

        store.prepend(record(-1, "R-002"), SyncState::LocalOptimistic);
        store.remove(&1);
        assert_eq!(store.revision(), loaded + 2);
    }
}
