use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use serde::Deserialize;
use tracing::{debug, instrument};

use super::{filter_local, ActiveFields, SearchFields};
use crate::client::CollectionSource;
use crate::errors::ServiceResult;
use crate::models::{ListQuery, Record};
use crate::sync::CollectionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SearchSettings {
    /// Page size of a single-field backend query.
    pub page_size: u32,
    /// Maximum number of dropdown suggestions.
    pub suggestion_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            suggestion_limit: 10,
        }
    }
}

/// Result of the last applied search and the store revision it was taken at.
#[derive(Debug)]
struct View<T> {
    fields: SearchFields,
    rows: Vec<T>,
    revision: u64,
}

/// Chooses between a backend query and local filtering for every search and owns
/// the visible result set of one listing.
///
/// The unfiltered listing is always the collection store itself. A filtered result
/// is re-derived from the store by local filtering once the store has changed since
/// the result arrived, so optimistic patches and reconciliations show up in it.
pub struct HybridSearchResolver<T: Record> {
    source: Arc<dyn CollectionSource<T>>,
    store: CollectionStore<T>,
    settings: SearchSettings,
    view: RwLock<View<T>>,
    searches: AtomicU64,
}

impl<T: Record> std::fmt::Debug for HybridSearchResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearchResolver")
            .field("settings", &self.settings)
            .field("visible", &self.visible().len())
            .finish()
    }
}

impl<T: Record> HybridSearchResolver<T> {
    pub fn new(
        source: Arc<dyn CollectionSource<T>>,
        store: CollectionStore<T>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            view: RwLock::new(View {
                fields: SearchFields::default(),
                rows: Vec::new(),
                revision: 0,
            }),
            searches: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    /// The listing shown when no filter is active.
    pub fn base(&self) -> Vec<T> {
        self.store.snapshot()
    }

    pub fn visible(&self) -> Vec<T> {
        let mut view = self.view_mut();
        if view.fields.active() == ActiveFields::None {
            return self.store.snapshot();
        }
        let revision = self.store.revision();
        if view.revision != revision {
            debug!(from = view.revision, to = revision, "re-deriving visible set from store");
            view.rows = filter_local(&self.store.snapshot(), &view.fields);
            view.revision = revision;
        }
        view.rows.clone()
    }

    /// Resolves `fields` and makes the result the visible set. On failure the
    /// visible set is left as it was.
    #[instrument(skip(self))]
    pub async fn search(&self, fields: &SearchFields) -> ServiceResult<Vec<T>> {
        let ticket = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        // taken before the request: a store change while it runs re-derives on read
        let revision = self.store.revision();
        let results = self.resolve(fields).await?;
        // an older search finishing late must not overwrite a newer one
        if self.searches.load(Ordering::SeqCst) == ticket {
            *self.view_mut() = View {
                fields: fields.clone(),
                rows: results.clone(),
                revision,
            };
        } else {
            debug!(ticket, "search superseded; visible set kept");
        }
        Ok(results)
    }

    /// Resolves `fields` for a suggestion dropdown; the visible set is untouched.
    #[instrument(skip(self))]
    pub async fn suggest(&self, fields: &SearchFields) -> ServiceResult<Vec<T>> {
        let mut results = self.resolve(fields).await?;
        results.truncate(self.settings.suggestion_limit);
        Ok(results)
    }

    async fn resolve(&self, fields: &SearchFields) -> ServiceResult<Vec<T>> {
        match fields.active() {
            ActiveFields::None => Ok(self.base()),
            ActiveFields::Single(field, term) => {
                let query = self.single_field_query(term);
                debug!(?field, ?query, "single-field backend search");
                let page = self.source.list(&query).await?;
                Ok(filter_local(&page.rows, fields))
            }
            ActiveFields::Both { .. } => {
                // the backend takes one term; the broad list is narrowed here
                debug!("two-field search over the full collection");
                let page = self.source.list(&ListQuery::all()).await?;
                Ok(filter_local(&page.rows, fields))
            }
        }
    }

    /// One-character terms are sent without a limit so short prefixes are not
    /// truncated to the first page.
    pub fn single_field_query(&self, term: &str) -> ListQuery {
        let limit = if term.chars().count() == 1 {
            None
        } else {
            Some(self.settings.page_size)
        };
        ListQuery::term(term, limit)
    }

    fn view_mut(&self) -> RwLockWriteGuard<'_, View<T>> {
        self.view.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
