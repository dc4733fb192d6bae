// Orchestration on top of the client, sync and search layers
pub mod collection;
pub mod consecutive;
pub mod module_session;
pub mod requests;

pub use collection::{CollectionService, MutationOutcome};
pub use consecutive::{next_code, ConsecutiveCodeGenerator};
pub use module_session::{
    enter_inventory, enter_requests, InventorySession, ModuleSession, RequestSession,
    SessionDeps, SessionSettings,
};
pub use requests::{front_codes, RequestService};
