use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::client::RemoteCollection;
use crate::errors::{ServiceError, ServiceResult};
use crate::events::{Event, EventSender, NoticeLevel};
use crate::models::{InventoryPatch, InventoryRecord, Optimistic, Record};
use crate::sync::{shallow_merge, CollectionStore, OptimisticMerger, Reconciliation};

/// Result of an accepted mutation. The reconciliation handle is absent when no
/// background refresh was scheduled.
#[derive(Debug)]
pub struct MutationOutcome<T: Record> {
    pub id: T::Id,
    pub reconciliation: Option<JoinHandle<ServiceResult<Reconciliation>>>,
}

impl<T: Record> MutationOutcome<T> {
    /// Waits for the scheduled reconciliation, if any.
    pub async fn settled(self) -> ServiceResult<Option<Reconciliation>> {
        match self.reconciliation {
            Some(handle) => handle
                .await
                .map_err(|e| ServiceError::InternalError(format!("reconciliation task failed: {}", e)))?
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Validation, backend call and local merge for one collection.
pub struct CollectionService<T: Optimistic> {
    remote: RemoteCollection<T>,
    merger: OptimisticMerger<T>,
    events: Option<EventSender>,
}

impl<T: Optimistic> Clone for CollectionService<T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            merger: self.merger.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: Optimistic> CollectionService<T> {
    pub fn new(remote: RemoteCollection<T>, events: Option<EventSender>) -> Self {
        let store = CollectionStore::new(remote.path());
        let merger = OptimisticMerger::new(
            store,
            std::sync::Arc::new(remote.clone()),
            events.clone(),
        );
        Self {
            remote,
            merger,
            events,
        }
    }

    pub fn remote(&self) -> &RemoteCollection<T> {
        &self.remote
    }

    pub fn store(&self) -> &CollectionStore<T> {
        self.merger.store()
    }

    pub fn merger(&self) -> &OptimisticMerger<T> {
        &self.merger
    }

    /// Fetches the full collection and replaces local state.
    #[instrument(skip(self), fields(collection = %self.remote.path()))]
    pub async fn load(&self) -> ServiceResult<Vec<T>> {
        self.merger.reconcile().await?;
        Ok(self.store().snapshot())
    }

    pub fn refresh(&self) -> JoinHandle<ServiceResult<Reconciliation>> {
        self.merger.spawn_reconcile()
    }

    #[instrument(skip(self, draft), fields(collection = %self.remote.path()))]
    pub async fn create(&self, draft: T::Draft) -> ServiceResult<MutationOutcome<T>> {
        draft.validate()?;
        let created = match self.remote.create(&draft).await {
            Ok(created) => created,
            Err(e) => return Err(self.rejected(e)),
        };

        let (id, handle) = match created.record {
            Some(record) => {
                let id = record.id();
                (id, self.merger.after_create_record(record))
            }
            None => self.merger.after_create(&draft, created.id),
        };
        info!(%id, "record created");
        self.notice(NoticeLevel::Info, "Record created");
        Ok(MutationOutcome {
            id,
            reconciliation: Some(handle),
        })
    }

    #[instrument(skip(self, patch), fields(collection = %self.remote.path()))]
    pub async fn update(&self, id: T::Id, patch: T::Patch) -> ServiceResult<MutationOutcome<T>> {
        patch.validate()?;
        let _guard = self.store().try_begin(&id)?;
        if let Some(current) = self.store().get(&id) {
            shallow_merge(&current, &patch)?.check_invariants()?;
        }

        match self.remote.update(&id, &patch).await {
            Ok(_) => {
                let handle = self.merger.after_update(&id, &patch)?;
                info!(%id, "record updated");
                self.notice(NoticeLevel::Info, "Changes saved");
                Ok(MutationOutcome {
                    id,
                    reconciliation: Some(handle),
                })
            }
            Err(e) if e.is_not_found() => Ok(self.already_gone(id)),
            Err(e) => Err(self.rejected(e)),
        }
    }

    #[instrument(skip(self), fields(collection = %self.remote.path()))]
    pub async fn delete(&self, id: T::Id) -> ServiceResult<MutationOutcome<T>> {
        let _guard = self.store().try_begin(&id)?;

        match self.remote.delete(&id).await {
            Ok(()) => {
                self.merger.after_delete(&id);
                info!(%id, "record deleted");
                self.notice(NoticeLevel::Info, "Record deleted");
                Ok(MutationOutcome {
                    id,
                    reconciliation: None,
                })
            }
            Err(e) if e.is_not_found() => Ok(self.already_gone(id)),
            Err(e) => Err(self.rejected(e)),
        }
    }

    /// The backend no longer has the record: drop it locally and re-sync.
    pub(crate) fn already_gone(&self, id: T::Id) -> MutationOutcome<T> {
        warn!(%id, "record already gone on the backend");
        self.merger.after_delete(&id);
        self.notice(NoticeLevel::Warning, ServiceError::NotFound(id.to_string()).user_message());
        MutationOutcome {
            id,
            reconciliation: Some(self.merger.spawn_reconcile()),
        }
    }

    /// Reports a rejected mutation. Local state is left untouched.
    pub(crate) fn rejected(&self, err: ServiceError) -> ServiceError {
        if err.is_auth() {
            warn!(error = %err, "mutation denied");
        } else {
            warn!(error = %err, "mutation rejected");
        }
        self.notice(NoticeLevel::Error, err.user_message());
        err
    }

    pub(crate) fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        if let Some(events) = &self.events {
            events.notify(Event::notice(level, message));
        }
    }
}

impl CollectionService<InventoryRecord> {
    /// Applies a signed delta to the existing quantity and returns the new quantity.
    #[instrument(skip(self), fields(collection = %self.remote.path()))]
    pub async fn adjust_stock(&self, id: i64, delta: Decimal) -> ServiceResult<Decimal> {
        let _guard = self.store().try_begin(&id)?;
        if let Some(mut candidate) = self.store().get(&id) {
            candidate.existing_quantity += delta;
            candidate.check_invariants()?;
        }

        let quantity = match self.remote.adjust(&id, delta).await {
            Ok(quantity) => quantity,
            Err(e) if e.is_not_found() => {
                self.already_gone(id);
                return Err(e);
            }
            Err(e) => return Err(self.rejected(e)),
        };

        let patch = InventoryPatch {
            existing_quantity: Some(quantity),
            ..Default::default()
        };
        // the refresh runs on its own; its failure is reported through events
        drop(self.merger.after_update(&id, &patch)?);
        info!(id, %delta, %quantity, "stock adjusted");
        Ok(quantity)
    }
}
