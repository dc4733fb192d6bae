//! Local collection state and its optimistic reconciliation with the backend.

pub mod merger;
pub mod store;

pub use merger::{OptimisticMerger, Reconciliation};
pub use store::{shallow_merge, BusyGuard, CollectionStore, SyncState};
