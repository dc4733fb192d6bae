//! Per-record document availability, resolved lazily and mirrored to the session store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashSet;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::SessionStore;
use crate::client::DocumentSource;
use crate::errors::ServiceResult;
use crate::events::{Event, EventSender};
use crate::models::{DocumentKind, Module};

/// Tri-state presence of one attached document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFlag {
    #[default]
    Unknown,
    Present,
    Absent,
}

impl DocFlag {
    /// Any failed probe counts as absent, whatever the cause.
    pub fn from_probe<T>(result: &ServiceResult<T>) -> Self {
        if result.is_ok() {
            DocFlag::Present
        } else {
            DocFlag::Absent
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityEntry {
    #[serde(default)]
    pub technical_sheet: DocFlag,
    #[serde(default)]
    pub safety_sheet: DocFlag,
}

impl AvailabilityEntry {
    pub fn flag(&self, kind: DocumentKind) -> DocFlag {
        match kind {
            DocumentKind::TechnicalSheet => self.technical_sheet,
            DocumentKind::SafetySheet => self.safety_sheet,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.technical_sheet != DocFlag::Unknown && self.safety_sheet != DocFlag::Unknown
    }

    fn merge(&mut self, patch: &AvailabilityPatch) {
        if let Some(flag) = patch.technical_sheet {
            self.technical_sheet = flag;
        }
        if let Some(flag) = patch.safety_sheet {
            self.safety_sheet = flag;
        }
    }
}

/// Fields left `None` keep their cached value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityPatch {
    pub technical_sheet: Option<DocFlag>,
    pub safety_sheet: Option<DocFlag>,
}

impl AvailabilityPatch {
    pub fn for_kind(kind: DocumentKind, flag: DocFlag) -> Self {
        match kind {
            DocumentKind::TechnicalSheet => Self {
                technical_sheet: Some(flag),
                safety_sheet: None,
            },
            DocumentKind::SafetySheet => Self {
                technical_sheet: None,
                safety_sheet: Some(flag),
            },
        }
    }

    pub fn both(technical_sheet: DocFlag, safety_sheet: DocFlag) -> Self {
        Self {
            technical_sheet: Some(technical_sheet),
            safety_sheet: Some(safety_sheet),
        }
    }
}

type Entries = HashMap<String, AvailabilityEntry>;

/// Keys claimed by one preload. They are released on drop, also when the
/// preload future is cancelled mid-probe.
struct InFlightClaims<'a> {
    in_flight: &'a DashSet<String>,
    keys: Vec<String>,
}

impl Drop for InFlightClaims<'_> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.in_flight.remove(key);
        }
    }
}

pub struct AvailabilityCache {
    module: Module,
    key: String,
    store: Arc<dyn SessionStore>,
    source: Arc<dyn DocumentSource>,
    entries: RwLock<Arc<Entries>>,
    in_flight: DashSet<String>,
    persist_lock: Mutex<()>,
    events: Option<EventSender>,
}

impl std::fmt::Debug for AvailabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityCache")
            .field("module", &self.module)
            .field("entries", &self.snapshot().len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl AvailabilityCache {
    /// Builds the cache for `module`, eagerly reading its persisted blob. A missing
    /// or unreadable blob starts the cache empty.
    pub async fn restore(
        module: Module,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn DocumentSource>,
        events: Option<EventSender>,
    ) -> Self {
        let key = module.availability_key();
        let entries = match store.get(&key).await {
            Ok(Some(blob)) => match serde_json::from_str::<Entries>(&blob) {
                Ok(entries) => {
                    debug!(%module, count = entries.len(), "availability cache restored");
                    entries
                }
                Err(e) => {
                    warn!(%module, error = %e, "discarding corrupt availability blob");
                    Entries::new()
                }
            },
            Ok(None) => Entries::new(),
            Err(e) => {
                warn!(%module, error = %e, "could not read availability blob");
                Entries::new()
            }
        };

        Self {
            module,
            key,
            store,
            source,
            entries: RwLock::new(Arc::new(entries)),
            in_flight: DashSet::new(),
            persist_lock: Mutex::new(()),
            events,
        }
    }

    pub fn module(&self) -> Module {
        self.module
    }

    /// Current entries. The returned map is immutable; later writes swap in a new one.
    pub fn snapshot(&self) -> Arc<Entries> {
        match self.entries.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn get(&self, key: &str) -> AvailabilityEntry {
        self.snapshot().get(key).copied().unwrap_or_default()
    }

    /// Both flags are known; a partially set entry still gets probed.
    pub fn is_resolved(&self, key: &str) -> bool {
        self.get(key).is_resolved()
    }

    pub async fn set(&self, key: &str, patch: AvailabilityPatch) {
        self.apply(std::iter::once((key.to_string(), patch)));
        self.persist().await;
    }

    /// Probes both documents of every key not yet resolved nor being probed, at most
    /// `max_batch` keys per call. Returns how many keys were probed.
    #[instrument(skip(self, keys), fields(module = %self.module))]
    pub async fn preload<I, S>(&self, keys: I, max_batch: usize) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut claims = InFlightClaims {
            in_flight: &self.in_flight,
            keys: Vec::new(),
        };
        for key in keys {
            if claims.keys.len() >= max_batch.max(1) {
                break;
            }
            let key = key.as_ref();
            if key.is_empty() || self.is_resolved(key) || !self.in_flight.insert(key.to_string()) {
                continue;
            }
            // another probe may have landed between the check and the claim
            if self.is_resolved(key) {
                self.in_flight.remove(key);
                continue;
            }
            claims.keys.push(key.to_string());
        }
        if claims.keys.is_empty() {
            return 0;
        }

        let source = &self.source;
        let probes = claims.keys.iter().map(|key| async move {
            let (technical, safety) = tokio::join!(
                source.document(key, DocumentKind::TechnicalSheet),
                source.document(key, DocumentKind::SafetySheet)
            );
            (
                key.clone(),
                AvailabilityPatch::both(DocFlag::from_probe(&technical), DocFlag::from_probe(&safety)),
            )
        });
        let resolved = join_all(probes).await;

        // publish before releasing the keys so no caller sees them as neither cached nor in flight
        self.apply(resolved);
        let claimed = claims.keys.clone();
        drop(claims);
        self.persist().await;

        debug!(count = claimed.len(), "availability probes resolved");
        if let Some(events) = &self.events {
            events.notify(Event::AvailabilityResolved {
                module: self.module,
                keys: claimed.clone(),
            });
        }
        claimed.len()
    }

    /// Drops every entry and the persisted blob.
    pub async fn clear(&self) {
        match self.entries.write() {
            Ok(mut guard) => *guard = Arc::new(Entries::new()),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(Entries::new()),
        }
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.store.delete(&self.key).await {
            warn!(module = %self.module, error = %e, "could not delete availability blob");
        }
    }

    /// Writes the current entries to the session store.
    pub async fn flush(&self) {
        self.persist().await;
    }

    fn apply<I>(&self, patches: I)
    where
        I: IntoIterator<Item = (String, AvailabilityPatch)>,
    {
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next: Entries = (**guard).clone();
        for (key, patch) in patches {
            next.entry(key).or_default().merge(&patch);
        }
        *guard = Arc::new(next);
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        // taken under the lock so the last writer always stores the newest map
        let snapshot = self.snapshot();
        let blob = match serde_json::to_string(&*snapshot) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(module = %self.module, error = %e, "could not serialize availability cache");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &blob).await {
            warn!(module = %self.module, error = %e, "could not persist availability cache");
        }
    }
}
