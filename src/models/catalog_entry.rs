use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Optimistic, Record};

/// Definitional record of a consumable or piece of equipment, independent of stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Computed by the backend: referenced by at least one inventory record.
    #[serde(default)]
    pub in_use: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCatalogEntry {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CatalogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Record for CatalogEntry {
    type Id = String;

    fn id(&self) -> String {
        self.code.clone()
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Optimistic for CatalogEntry {
    type Draft = NewCatalogEntry;
    type Patch = CatalogPatch;

    // the code is the identity and is always chosen client-side
    fn provisional_id(draft: &NewCatalogEntry, _fallback: i64) -> String {
        draft.code.clone()
    }

    fn synthesize(draft: &NewCatalogEntry, id: String) -> Self {
        Self {
            code: id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            image: draft.image.clone(),
            in_use: None,
        }
    }
}
