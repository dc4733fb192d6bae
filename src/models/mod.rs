//! Typed records exchanged with the backend, one per domain collection.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use strum::{AsRefStr, Display, EnumString};
use validator::{Validate, ValidationErrors};

pub mod catalog_entry;
pub mod inventory_record;
pub mod request_record;

pub use catalog_entry::{CatalogEntry, CatalogPatch, NewCatalogEntry};
pub use inventory_record::{InventoryPatch, InventoryRecord, NewInventoryRecord};
pub use request_record::{
    CommercialOffer, InternalReview, NewRequestRecord, RequestDetail, RequestPatch,
    RequestRecord, RequestSection, ServiceSurvey,
};

/// A record held in a client-side collection.
pub trait Record:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: Clone
        + Eq
        + Hash
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn id(&self) -> Self::Id;

    /// Category code; feeds consecutive code generation and document lookups.
    fn code(&self) -> &str;

    /// Text matched by the "name" search field.
    fn display_name(&self) -> &str;

    /// Text matched by the "id" search field.
    fn search_id(&self) -> &str {
        self.code()
    }

    /// Cross-field rules that must hold before a record is sent to the backend.
    fn check_invariants(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Records that can be shown before the backend returns their joined form.
pub trait Optimistic: Record {
    /// Form payload submitted on create.
    type Draft: Serialize + Validate + Clone + fmt::Debug + Send + Sync + 'static;
    /// Partial update; only fields that are `Some` are sent and merged. Its own
    /// rules are checked before any merge with the held record.
    type Patch: Serialize + Validate + Clone + fmt::Debug + Send + Sync + 'static;

    /// Identifier to use when the create response carries none.
    fn provisional_id(draft: &Self::Draft, fallback: i64) -> Self::Id;

    /// Builds the provisional display record. Fields only the server can compute
    /// are left `None`, never guessed.
    fn synthesize(draft: &Self::Draft, id: Self::Id) -> Self;
}

/// Domain modules of the console. Each owns a catalog and a stock/records collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    Reagents,
    Supplies,
    Stationery,
    Equipment,
    ReferenceMaterials,
    Requests,
}

impl Module {
    pub fn catalog_path(&self) -> String {
        format!("{}/catalog", self)
    }

    pub fn records_path(&self) -> String {
        match self {
            Module::Requests => format!("{}/records", self),
            _ => format!("{}/inventory", self),
        }
    }

    /// Session store key of this module's availability blob.
    pub fn availability_key(&self) -> String {
        format!("availability:{}", self)
    }
}

/// Attached documents whose presence is tracked per catalog code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    TechnicalSheet,
    SafetySheet,
}

/// Query string of a collection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn term(q: impl Into<String>, limit: Option<u32>) -> Self {
        Self {
            q: Some(q.into()),
            limit,
            offset: None,
        }
    }
}

/// One listing page. `total` is only known when the backend answers `{rows, total}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn total_or_len(&self) -> u64 {
        self.total.unwrap_or(self.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn module_paths() {
        assert_eq!(Module::Reagents.catalog_path(), "reagents/catalog");
        assert_eq!(Module::ReferenceMaterials.records_path(), "reference-materials/inventory");
        assert_eq!(Module::Requests.records_path(), "requests/records");
        assert_eq!(Module::Stationery.availability_key(), "availability:stationery");
    }

    #[test]
    fn module_parses_from_cli_text() {
        assert_eq!(Module::from_str("reference-materials").unwrap(), Module::ReferenceMaterials);
        assert!(Module::from_str("users").is_err());
    }

    #[test]
    fn document_kind_path_segments() {
        assert_eq!(DocumentKind::TechnicalSheet.as_ref(), "technical-sheet");
        assert_eq!(DocumentKind::SafetySheet.to_string(), "safety-sheet");
    }
}
