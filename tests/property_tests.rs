//! Property-based tests for search normalization and code suggestion.

use labsync::models::CatalogEntry;
use labsync::search::{filter_local, matches, normalize, SearchFields};
use labsync::services::consecutive::{code_suffix, next_code};
use proptest::prelude::*;

fn prefix_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{1,3}"
}

fn entry(code: &str, name: &str) -> CatalogEntry {
    CatalogEntry {
        code: code.to_string(),
        name: name.to_string(),
        description: None,
        image: None,
        in_use: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalize_is_idempotent(s in "[a-zA-Z0-9áéíóúÁÉÍÓÚñÑüÜçÇ µ.-]{0,40}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn matching_ignores_case(word in "[a-z]{1,12}") {
        let shouted = word.to_uppercase();
        prop_assert!(matches(&shouted, &word));
        let wrapped = format!("x{}y", word);
        prop_assert!(matches(&wrapped, &shouted));
    }

    #[test]
    fn empty_filter_keeps_everything(names in proptest::collection::vec("[a-zA-Z ]{0,12}", 0..20)) {
        let records: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| entry(&format!("R-{:03}", i + 1), n))
            .collect();
        prop_assert_eq!(filter_local(&records, &SearchFields::default()).len(), records.len());
    }

    #[test]
    fn next_code_exceeds_every_existing_suffix(
        prefix in prefix_strategy(),
        numbers in proptest::collection::vec(1u64..5000, 0..30),
    ) {
        let codes: Vec<String> = numbers.iter().map(|n| format!("{}-{:03}", prefix, n)).collect();
        let suggested = next_code(&prefix, &codes, 3);
        let suffix = code_suffix(&prefix, &suggested).unwrap();
        prop_assert_eq!(suffix, numbers.iter().copied().max().unwrap_or(0) + 1);
        prop_assert!(!codes.contains(&suggested));
    }

    #[test]
    fn foreign_prefixes_are_ignored(n in 1u64..999) {
        let codes = vec![format!("X-{:03}", n), format!("SX-{:03}", n)];
        prop_assert_eq!(next_code("S", &codes, 3), "S-001");
    }

    #[test]
    fn suggested_codes_are_padded(prefix in prefix_strategy(), width in 1usize..6) {
        let code = next_code(&prefix, Vec::<String>::new(), width);
        prop_assert_eq!(code.len(), prefix.len() + 1 + width);
    }
}
