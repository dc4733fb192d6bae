//! Next free sequential code per category prefix, e.g. `S-004` after `S-003`.
//!
//! Codes are advisory. The backend rejects a collision with 409 and the user
//! retries with a fresh suggestion.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::collection::CollectionService;
use crate::errors::ServiceResult;
use crate::models::{Optimistic, Record};
use crate::sync::CollectionStore;

pub const DEFAULT_CODE_WIDTH: usize = 3;

/// Anything holding records whose codes count toward the sequence.
pub trait CodeSource: Send + Sync {
    fn codes(&self) -> Vec<String>;
}

impl<T: Record> CodeSource for CollectionStore<T> {
    fn codes(&self) -> Vec<String> {
        CollectionStore::codes(self)
    }
}

/// Numeric suffix of `code` when it reads `<prefix>-<n>` with `n > 0`.
pub fn code_suffix(prefix: &str, code: &str) -> Option<u64> {
    let digits = code.trim().strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

/// Highest suffix among `codes` plus one, left-padded with zeros to `width`.
/// A suffix that has no successor in `u64` is skipped.
pub fn next_code<I, S>(prefix: &str, codes: I, width: usize) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let next = codes
        .into_iter()
        .filter_map(|code| code_suffix(prefix, code.as_ref())?.checked_add(1))
        .max()
        .unwrap_or(1);
    format!("{}-{:0width$}", prefix, next, width = width)
}

/// Reads every source on each call, so a suggestion always reflects the latest
/// local state of both collections.
#[derive(Clone)]
pub struct ConsecutiveCodeGenerator {
    sources: Vec<Arc<dyn CodeSource>>,
    width: usize,
}

impl std::fmt::Debug for ConsecutiveCodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsecutiveCodeGenerator")
            .field("sources", &self.sources.len())
            .field("width", &self.width)
            .finish()
    }
}

impl ConsecutiveCodeGenerator {
    pub fn new(sources: Vec<Arc<dyn CodeSource>>, width: usize) -> Self {
        Self { sources, width }
    }

    /// Loads the catalog and the records collection concurrently, then builds a
    /// generator over both stores.
    #[instrument(skip_all)]
    pub async fn load<C, R>(
        catalog: &CollectionService<C>,
        records: &CollectionService<R>,
        width: usize,
    ) -> ServiceResult<Self>
    where
        C: Optimistic,
        R: Optimistic,
    {
        tokio::try_join!(catalog.load(), records.load())?;
        Ok(Self::over(catalog.store(), records.store(), width))
    }

    /// Generator over two already loaded stores.
    pub fn over<C: Record, R: Record>(
        catalog: &CollectionStore<C>,
        records: &CollectionStore<R>,
        width: usize,
    ) -> Self {
        let catalog: Arc<dyn CodeSource> = Arc::new(catalog.clone());
        let records: Arc<dyn CodeSource> = Arc::new(records.clone());
        Self::new(vec![catalog, records], width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn next_code(&self, prefix: &str) -> String {
        let code = next_code(
            prefix,
            self.sources.iter().flat_map(|source| source.codes()),
            self.width,
        );
        debug!(prefix, %code, "next consecutive code");
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, InventoryRecord};
    use crate::sync::SyncState;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case("S-001", Some(1))]
    #[case("S-010", Some(10))]
    #[case("S-000", None)]
    #[case("S-", None)]
    #[case("S-1a", None)]
    #[case("S--1", None)]
    #[case("SX-002", None)]
    #[case("R-002", None)]
    #[case("S-18446744073709551615", Some(u64::MAX))]
    #[case("S-18446744073709551616", None)]
    fn suffixes(#[case] code: &str, #[case] expected: Option<u64>) {
        assert_eq!(code_suffix("S", code), expected);
    }

    #[test]
    fn union_of_both_collections() {
        assert_eq!(next_code("S", ["S-001", "S-003", "S-002"], 3), "S-004");
    }

    #[test]
    fn empty_and_unrelated_codes_start_at_one() {
        assert_eq!(next_code("S", Vec::<String>::new(), 3), "S-001");
        assert_eq!(next_code("S", ["R-900", "S-abc"], 3), "S-001");
    }

    #[rstest]
    #[case(&["S-18446744073709551615"], "S-001")]
    #[case(&["S-18446744073709551615", "S-007"], "S-008")]
    #[case(&["S-18446744073709551614"], "S-18446744073709551615")]
    fn suffix_without_successor_is_skipped(#[case] codes: &[&str], #[case] expected: &str) {
        assert_eq!(next_code("S", codes, 3), expected);
    }

    #[test]
    fn width_pads_but_never_truncates() {
        assert_eq!(next_code("E", ["E-999"], 3), "E-1000");
        assert_eq!(next_code("E", ["E-7"], 5), "E-00008");
    }

    fn catalog(code: &str) -> CatalogEntry {
        CatalogEntry {
            code: code.into(),
            name: code.into(),
            description: None,
            image: None,
            in_use: None,
        }
    }

    fn stock(id: i64, code: &str) -> InventoryRecord {
        InventoryRecord {
            id,
            code: code.into(),
            lot: None,
            acquired_quantity: Decimal::ONE,
            existing_quantity: Decimal::ONE,
            acquired_on: None,
            location: None,
            notes: None,
            name: None,
            description: None,
            image: None,
            low_stock: None,
        }
    }

    #[test]
    fn generator_sees_changes_without_caching() {
        let catalog_store = CollectionStore::new("supplies/catalog");
        let stock_store = CollectionStore::new("supplies/inventory");
        catalog_store.apply_reconciliation(
            catalog_store.begin_sequence(),
            vec![catalog("S-001"), catalog("S-003")],
        );
        stock_store.apply_reconciliation(stock_store.begin_sequence(), vec![stock(1, "S-002")]);

        let generator = ConsecutiveCodeGenerator::over(&catalog_store, &stock_store, 3);
        assert_eq!(generator.next_code("S"), "S-004");

        catalog_store.prepend(catalog("S-004"), SyncState::LocalOptimistic);
        assert_eq!(generator.next_code("S"), "S-005");
    }
}
