//! Case- and accent-insensitive text canonicalization.
//!
//! Every filter in every module goes through [`normalize`]; two modules must never
//! disagree about whether a term matches.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-cases, decomposes (NFD), drops combining marks and trims.
///
/// ```
/// use labsync::search::normalize;
/// assert_eq!(normalize("  Ñandú "), "nandu");
/// ```
pub fn normalize(s: &str) -> String {
    s.chars().flat_map(fold_char).collect::<String>().trim().to_string()
}

/// Folded form of a single character; empty for a combining mark.
///
/// Folding is context free, so a folded string maps back to the source text one
/// character at a time. Final sigma folds like any other sigma.
pub(crate) fn fold_char(ch: char) -> impl Iterator<Item = char> {
    // lowercase first: some lowercase mappings produce combining marks themselves
    ch.to_lowercase()
        .map(|c| if c == 'ς' { 'σ' } else { c })
        .nfd()
        .filter(|c| !is_combining_mark(*c))
}

/// Normalized substring test. An empty needle matches everything.
pub fn matches(haystack: &str, needle: &str) -> bool {
    let needle = normalize(needle);
    needle.is_empty() || normalize(haystack).contains(&needle)
}

/// Variant of [`matches`] for a needle that is already normalized, used in
/// tight filter loops.
pub fn matches_normalized(haystack: &str, normalized_needle: &str) -> bool {
    normalized_needle.is_empty() || normalize(haystack).contains(normalized_needle)
}
