use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::store::{CollectionStore, SyncState};
use crate::client::CollectionSource;
use crate::errors::ServiceResult;
use crate::events::{Event, EventSender, NoticeLevel};
use crate::models::{ListQuery, Optimistic};

/// Outcome of one reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied { sequence: u64, rows: usize },
    /// A newer reconciliation was issued while this one was in flight.
    Discarded { sequence: u64 },
}

/// Applies mutation results locally at once and re-fetches the authoritative
/// collection in the background.
pub struct OptimisticMerger<T: Optimistic> {
    store: CollectionStore<T>,
    source: Arc<dyn CollectionSource<T>>,
    events: Option<EventSender>,
}

impl<T: Optimistic> Clone for OptimisticMerger<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: Arc::clone(&self.source),
            events: self.events.clone(),
        }
    }
}

impl<T: Optimistic> OptimisticMerger<T> {
    pub fn new(
        store: CollectionStore<T>,
        source: Arc<dyn CollectionSource<T>>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            store,
            source,
            events,
        }
    }

    pub fn store(&self) -> &CollectionStore<T> {
        &self.store
    }

    /// Prepends a provisional record built from `draft` and schedules a reconciliation.
    /// Without a server id the record gets a client-side provisional one, which is
    /// returned along with the reconciliation handle.
    pub fn after_create(
        &self,
        draft: &T::Draft,
        response_id: Option<T::Id>,
    ) -> (T::Id, JoinHandle<ServiceResult<Reconciliation>>) {
        let id = response_id
            .unwrap_or_else(|| T::provisional_id(draft, self.store.next_provisional_id()));
        debug!(collection = self.store.name(), %id, "prepending provisional record");
        self.store
            .prepend(T::synthesize(draft, id.clone()), SyncState::LocalOptimistic);
        (id, self.spawn_reconcile())
    }

    /// Same as [`after_create`](Self::after_create) when the backend already answered
    /// with the complete record.
    pub fn after_create_record(&self, record: T) -> JoinHandle<ServiceResult<Reconciliation>> {
        self.store.prepend(record, SyncState::LocalOptimistic);
        self.spawn_reconcile()
    }

    /// Overlays the present fields of `patch` on the matching record and schedules
    /// a reconciliation.
    pub fn after_update(
        &self,
        id: &T::Id,
        patch: &T::Patch,
    ) -> ServiceResult<JoinHandle<ServiceResult<Reconciliation>>> {
        if !self.store.merge_patch(id, patch)? {
            debug!(collection = self.store.name(), %id, "updated record not held locally");
        }
        Ok(self.spawn_reconcile())
    }

    /// Removes the record locally. No reconciliation is needed for a confirmed delete.
    pub fn after_delete(&self, id: &T::Id) -> Option<T> {
        self.store.remove(id)
    }

    /// Issues a sequence number now and reconciles on a background task.
    pub fn spawn_reconcile(&self) -> JoinHandle<ServiceResult<Reconciliation>> {
        let sequence = self.store.begin_sequence();
        let merger = self.clone();
        tokio::spawn(async move { merger.reconcile_tagged(sequence).await })
    }

    /// Reconciles in the caller's task.
    pub async fn reconcile(&self) -> ServiceResult<Reconciliation> {
        let sequence = self.store.begin_sequence();
        self.reconcile_tagged(sequence).await
    }

    #[instrument(skip(self), fields(collection = %self.store.name()))]
    async fn reconcile_tagged(&self, sequence: u64) -> ServiceResult<Reconciliation> {
        let collection = self.store.name().to_string();
        match self.source.list(&ListQuery::all()).await {
            Ok(page) => {
                let rows = page.rows.len();
                if self.store.apply_reconciliation(sequence, page.rows) {
                    info!(sequence, rows, "collection reconciled");
                    self.emit(Event::Reconciled {
                        collection,
                        sequence,
                        rows,
                    });
                    Ok(Reconciliation::Applied { sequence, rows })
                } else {
                    let latest = self.store.latest_issued();
                    debug!(sequence, latest, "discarding stale reconciliation");
                    self.emit(Event::ReconcileDiscarded {
                        collection,
                        sequence,
                        latest,
                    });
                    Ok(Reconciliation::Discarded { sequence })
                }
            }
            Err(e) => {
                // a newer reconciliation owns the outcome
                if !self.store.is_latest(sequence) {
                    debug!(sequence, error = %e, "superseded reconciliation failed");
                    return Ok(Reconciliation::Discarded { sequence });
                }
                let stale = self.store.mark_pending_stale();
                warn!(sequence, stale, error = %e, "reconciliation failed; keeping local state");
                self.emit(Event::ReconcileFailed {
                    collection,
                    sequence,
                    message: e.to_string(),
                });
                self.emit(Event::notice(
                    NoticeLevel::Warning,
                    format!("Saved, but the list could not be refreshed: {}", e.user_message()),
                ));
                Err(e)
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::models::{CatalogEntry, CatalogPatch, NewCatalogEntry, Page};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    fn entry(code: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            code: code.into(),
            name: name.into(),
            description: Some("joined".into()),
            image: None,
            in_use: Some(true),
        }
    }

    /// Answers listings from a queue of scripted responses, each after its delay.
    struct Scripted {
        responses: Mutex<VecDeque<(Duration, ServiceResult<Vec<CatalogEntry>>)>>,
    }

    impl Scripted {
        fn new(responses: Vec<(Duration, ServiceResult<Vec<CatalogEntry>>)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CollectionSource<CatalogEntry> for Scripted {
        async fn list(&self, _query: &ListQuery) -> ServiceResult<Page<CatalogEntry>> {
            let next = self.responses.lock().unwrap().pop_front();
            let (delay, result) =
                next.unwrap_or_else(|| (Duration::ZERO, Err(ServiceError::Transport("no script".into()))));
            tokio::time::sleep(delay).await;
            result.map(|rows| Page { rows, total: None })
        }
    }

    fn draft() -> NewCatalogEntry {
        NewCatalogEntry {
            code: "X-1".into(),
            name: "Test".into(),
            description: None,
            image: None,
        }
    }

    #[tokio::test]
    async fn create_shows_provisional_record_then_reconciles() {
        let source = Scripted::new(vec![(
            Duration::from_millis(10),
            Ok(vec![entry("X-1", "Test"), entry("A-001", "Acido")]),
        )]);
        let merger = OptimisticMerger::new(CollectionStore::new("c"), source, None);

        let (id, handle) = merger.after_create(&draft(), None);
        assert_eq!(id, "X-1");
        let first = merger.store().first().unwrap();
        assert_eq!(first.code, "X-1");
        assert_eq!(first.in_use, None);
        assert_eq!(first.description, None);
        assert_eq!(merger.store().state(&"X-1".to_string()), Some(SyncState::LocalOptimistic));

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, Reconciliation::Applied { sequence: 1, rows: 2 });
        let reconciled = merger.store().get(&"X-1".to_string()).unwrap();
        assert_eq!(reconciled.in_use, Some(true));
        assert_eq!(merger.store().state(&"X-1".to_string()), Some(SyncState::Reconciled));
    }

    #[tokio::test]
    async fn slower_older_response_is_discarded() {
        let source = Scripted::new(vec![
            (Duration::from_millis(60), Ok(vec![entry("OLD-1", "Old")])),
            (Duration::from_millis(5), Ok(vec![entry("NEW-1", "New")])),
        ]);
        let merger = OptimisticMerger::new(CollectionStore::new("c"), source, None);

        let older = merger.spawn_reconcile();
        let newer = merger.spawn_reconcile();

        assert_eq!(
            newer.await.unwrap().unwrap(),
            Reconciliation::Applied { sequence: 2, rows: 1 }
        );
        assert_eq!(
            older.await.unwrap().unwrap(),
            Reconciliation::Discarded { sequence: 1 }
        );
        assert_eq!(merger.store().codes(), vec!["NEW-1".to_string()]);
    }

    #[tokio::test]
    async fn failed_reconciliation_keeps_patch_and_marks_stale() {
        let source = Scripted::new(vec![
            (Duration::ZERO, Ok(vec![entry("A-001", "Acido")])),
            (Duration::ZERO, Err(ServiceError::Transport("offline".into()))),
            (Duration::ZERO, Ok(vec![entry("A-001", "Acido fuerte")])),
        ]);
        let (events, mut rx) = EventSender::channel(16);
        let merger = OptimisticMerger::new(CollectionStore::new("c"), source, Some(events));
        merger.reconcile().await.unwrap();
        let id = "A-001".to_string();

        let patch = CatalogPatch {
            name: Some("Acido fuerte".into()),
            ..Default::default()
        };
        let result = merger.after_update(&id, &patch).unwrap().await.unwrap();
        assert!(matches!(result, Err(ServiceError::Transport(_))));
        assert_eq!(merger.store().get(&id).unwrap().name, "Acido fuerte");
        assert_eq!(merger.store().state(&id), Some(SyncState::Stale));

        merger.reconcile().await.unwrap();
        assert_eq!(merger.store().state(&id), Some(SyncState::Reconciled));

        let mut saw_notice = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::Notice { level, .. } = event {
                saw_notice = level == NoticeLevel::Warning;
            }
        }
        assert!(saw_notice);
    }

    #[tokio::test]
    async fn delete_removes_immediately() {
        let source = Scripted::new(vec![(Duration::ZERO, Ok(vec![entry("A-001", "Acido")]))]);
        let merger = OptimisticMerger::new(CollectionStore::new("c"), source, None);
        merger.reconcile().await.unwrap();

        assert!(merger.after_delete(&"A-001".to_string()).is_some());
        assert!(merger.store().is_empty());
        assert!(merger.after_delete(&"A-001".to_string()).is_none());
    }
}
