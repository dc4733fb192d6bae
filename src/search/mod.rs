//! Free-text filtering shared by every domain module.

use serde::{Deserialize, Serialize};

use crate::models::Record;

pub mod highlight;
pub mod normalize;
pub mod resolver;

pub use highlight::highlight;
pub use normalize::{matches, normalize};
pub use resolver::{HybridSearchResolver, SearchSettings};

/// The two filter inputs shown above every listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFields {
    #[serde(default)]
    pub by_id: Option<String>,
    #[serde(default)]
    pub by_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Id,
    Name,
}

/// Which inputs carry a usable term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFields<'a> {
    None,
    Single(SearchField, &'a str),
    Both { id: &'a str, name: &'a str },
}

impl SearchFields {
    pub fn by_id(term: impl Into<String>) -> Self {
        Self {
            by_id: Some(term.into()),
            by_name: None,
        }
    }

    pub fn by_name(term: impl Into<String>) -> Self {
        Self {
            by_id: None,
            by_name: Some(term.into()),
        }
    }

    pub fn both(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            by_id: Some(id.into()),
            by_name: Some(name.into()),
        }
    }

    fn term(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn active(&self) -> ActiveFields<'_> {
        match (Self::term(&self.by_id), Self::term(&self.by_name)) {
            (None, None) => ActiveFields::None,
            (Some(id), None) => ActiveFields::Single(SearchField::Id, id),
            (None, Some(name)) => ActiveFields::Single(SearchField::Name, name),
            (Some(id), Some(name)) => ActiveFields::Both { id, name },
        }
    }

    /// Exactly one input is in use; only then are matches highlighted.
    pub fn exclusive_field(&self) -> Option<SearchField> {
        match self.active() {
            ActiveFields::Single(field, _) => Some(field),
            _ => None,
        }
    }
}

fn field_text<T: Record>(record: &T, field: SearchField) -> &str {
    match field {
        SearchField::Id => record.search_id(),
        SearchField::Name => record.display_name(),
    }
}

/// Local filtering: conjunction of the active fields over normalized text.
pub fn filter_local<T: Record>(records: &[T], fields: &SearchFields) -> Vec<T> {
    match fields.active() {
        ActiveFields::None => records.to_vec(),
        ActiveFields::Single(field, term) => {
            let needle = normalize(term);
            records
                .iter()
                .filter(|r| normalize::matches_normalized(field_text(*r, field), &needle))
                .cloned()
                .collect()
        }
        ActiveFields::Both { id, name } => {
            let id = normalize(id);
            let name = normalize(name);
            records
                .iter()
                .filter(|r| {
                    normalize::matches_normalized(r.search_id(), &id)
                        && normalize::matches_normalized(r.display_name(), &name)
                })
                .cloned()
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;

    fn entry(code: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            code: code.into(),
            name: name.into(),
            description: None,
            image: None,
            in_use: None,
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![entry("A-001", "Acido"), entry("B-002", "Base")]
    }

    #[test]
    fn blank_terms_are_inactive() {
        let fields = SearchFields {
            by_id: Some("   ".into()),
            by_name: None,
        };
        assert_eq!(fields.active(), ActiveFields::None);
        assert_eq!(fields.exclusive_field(), None);
    }

    #[test]
    fn id_only_filter() {
        let hits = filter_local(&catalog(), &SearchFields::by_id("a-0"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "A-001");
    }

    #[test]
    fn name_only_filter() {
        let hits = filter_local(&catalog(), &SearchFields::by_name("aci"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Acido");
    }

    #[test]
    fn both_fields_are_conjunctive() {
        assert!(filter_local(&catalog(), &SearchFields::both("a", "base")).is_empty());
        assert_eq!(filter_local(&catalog(), &SearchFields::both("b", "base")).len(), 1);
    }

    #[test]
    fn accent_insensitive_name_filter() {
        let records = vec![entry("R-010", "Ácido nítrico")];
        assert_eq!(filter_local(&records, &SearchFields::by_name("NITRICO")).len(), 1);
    }
}
