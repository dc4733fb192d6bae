use std::sync::Arc;

use tracing::{info, instrument};

use super::collection::CollectionService;
use super::consecutive::ConsecutiveCodeGenerator;
use super::requests::RequestService;
use crate::cache::{AvailabilityCache, SessionStore};
use crate::client::ApiClient;
use crate::config::SyncConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::events::EventSender;
use crate::models::{CatalogEntry, InventoryRecord, Module, Optimistic, Record, RequestRecord};
use crate::search::{HybridSearchResolver, SearchFields, SearchSettings};

/// Knobs a session needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub preload_batch: usize,
    pub code_width: usize,
    pub search: SearchSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            preload_batch: 20,
            code_width: super::consecutive::DEFAULT_CODE_WIDTH,
            search: SearchSettings::default(),
        }
    }
}

impl From<&SyncConfig> for SessionSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            preload_batch: config.preload_batch,
            code_width: config.code_width,
            search: config.search_settings(),
        }
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub client: ApiClient,
    pub store: Arc<dyn SessionStore>,
    pub events: Option<EventSender>,
    pub settings: SessionSettings,
}

/// Everything one domain module works with while it is open: its catalog and
/// records collections, their search resolvers, document availability and code
/// suggestions. Created by [`enter`](Self::enter) and released by
/// [`dispose`](Self::dispose); nothing is shared between modules.
pub struct ModuleSession<R: Optimistic> {
    module: Module,
    settings: SessionSettings,
    catalog: CollectionService<CatalogEntry>,
    records: CollectionService<R>,
    catalog_search: HybridSearchResolver<CatalogEntry>,
    records_search: HybridSearchResolver<R>,
    availability: Arc<AvailabilityCache>,
    codes: ConsecutiveCodeGenerator,
}

pub type InventorySession = ModuleSession<InventoryRecord>;
pub type RequestSession = ModuleSession<RequestRecord>;

impl<R: Optimistic> std::fmt::Debug for ModuleSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSession")
            .field("module", &self.module)
            .field("catalog", &self.catalog.store().len())
            .field("records", &self.records.store().len())
            .finish()
    }
}

impl<R: Optimistic> ModuleSession<R> {
    /// Builds the module's services, restores its availability cache and loads the
    /// catalog and records concurrently.
    #[instrument(skip(deps))]
    pub async fn enter(module: Module, deps: SessionDeps) -> ServiceResult<Self> {
        let catalog_remote = deps.client.collection::<CatalogEntry>(module.catalog_path());
        let records_remote = deps.client.collection::<R>(module.records_path());

        let catalog = CollectionService::new(catalog_remote.clone(), deps.events.clone());
        let records = CollectionService::new(records_remote.clone(), deps.events.clone());
        let availability = Arc::new(
            AvailabilityCache::restore(
                module,
                Arc::clone(&deps.store),
                Arc::new(catalog_remote.clone()),
                deps.events.clone(),
            )
            .await,
        );

        let codes =
            ConsecutiveCodeGenerator::load(&catalog, &records, deps.settings.code_width).await?;

        let catalog_search = HybridSearchResolver::new(
            Arc::new(catalog_remote),
            catalog.store().clone(),
            deps.settings.search,
        );
        let records_search = HybridSearchResolver::new(
            Arc::new(records_remote),
            records.store().clone(),
            deps.settings.search,
        );

        info!(
            %module,
            catalog = catalog.store().len(),
            records = records.store().len(),
            "module session entered"
        );
        Ok(Self {
            module,
            settings: deps.settings,
            catalog,
            records,
            catalog_search,
            records_search,
            availability,
            codes,
        })
    }

    /// Persists the availability cache and releases the session.
    #[instrument(skip(self), fields(module = %self.module))]
    pub async fn dispose(self) {
        self.availability.flush().await;
        info!("module session disposed");
    }

    pub fn module(&self) -> Module {
        self.module
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn catalog(&self) -> &CollectionService<CatalogEntry> {
        &self.catalog
    }

    pub fn records(&self) -> &CollectionService<R> {
        &self.records
    }

    pub fn catalog_search(&self) -> &HybridSearchResolver<CatalogEntry> {
        &self.catalog_search
    }

    pub fn records_search(&self) -> &HybridSearchResolver<R> {
        &self.records_search
    }

    pub fn availability(&self) -> &Arc<AvailabilityCache> {
        &self.availability
    }

    pub fn next_code(&self, prefix: &str) -> String {
        self.codes.next_code(prefix)
    }

    /// Reloads both collections; the search listings read from the reloaded stores.
    pub async fn reload(&self) -> ServiceResult<()> {
        tokio::try_join!(self.catalog.load(), self.records.load())?;
        Ok(())
    }

    /// Searches the records listing and resolves document availability for the
    /// codes that became visible.
    pub async fn search_records(&self, fields: &SearchFields) -> ServiceResult<Vec<R>> {
        let visible = self.records_search.search(fields).await?;
        self.preload_documents(&visible).await;
        Ok(visible)
    }

    pub async fn search_catalog(&self, fields: &SearchFields) -> ServiceResult<Vec<CatalogEntry>> {
        let visible = self.catalog_search.search(fields).await?;
        self.preload_documents(&visible).await;
        Ok(visible)
    }

    /// Probes the documents of the given records' catalog codes, one batch at a time.
    pub async fn preload_documents<T: Record>(&self, records: &[T]) -> usize {
        let keys: Vec<&str> = records.iter().map(|r| r.code()).collect();
        self.availability
            .preload(keys, self.settings.preload_batch)
            .await
    }
}

impl ModuleSession<RequestRecord> {
    pub fn requests(&self) -> RequestService {
        RequestService::new(self.records.clone(), self.settings.code_width)
    }
}

/// Opens an inventory module; the request module has its own record type.
pub async fn enter_inventory(module: Module, deps: SessionDeps) -> ServiceResult<InventorySession> {
    if module == Module::Requests {
        return Err(ServiceError::Config(
            "the requests module holds request records, not inventory".to_string(),
        ));
    }
    ModuleSession::enter(module, deps).await
}

pub async fn enter_requests(deps: SessionDeps) -> ServiceResult<RequestSession> {
    ModuleSession::enter(Module::Requests, deps).await
}
