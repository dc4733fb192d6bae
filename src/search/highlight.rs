use std::ops::Range;

use super::normalize::fold_char;
use super::{normalize, SearchField, SearchFields};

/// Byte ranges of `text` to highlight for `field`.
///
/// Empty unless `field` is the only active filter: with an AND filter in effect,
/// marking substrings would point at fields that were not what the user typed into.
pub fn highlight(text: &str, fields: &SearchFields, field: SearchField) -> Vec<Range<usize>> {
    if fields.exclusive_field() != Some(field) {
        return Vec::new();
    }
    let term = match field {
        SearchField::Id => fields.by_id.as_deref(),
        SearchField::Name => fields.by_name.as_deref(),
    };
    match term {
        Some(term) => match_ranges(text, &normalize(term)),
        None => Vec::new(),
    }
}

/// Non-overlapping occurrences of an already normalized needle, mapped back to
/// byte ranges of the original text. Trailing combining marks stay inside the range.
pub fn match_ranges(text: &str, needle: &str) -> Vec<Range<usize>> {
    if needle.is_empty() {
        return Vec::new();
    }

    let mut folded = String::with_capacity(text.len());
    // original char start for every byte of `folded`
    let mut origin: Vec<usize> = Vec::with_capacity(text.len());
    // original char starts that produced folded output
    let mut visible_starts: Vec<usize> = Vec::new();

    for (start, ch) in text.char_indices() {
        let piece: String = fold_char(ch).collect();
        if piece.is_empty() {
            continue;
        }
        visible_starts.push(start);
        origin.extend(std::iter::repeat(start).take(piece.len()));
        folded.push_str(&piece);
    }

    folded
        .match_indices(needle)
        .map(|(at, m)| {
            let begin = origin[at];
            let last = origin[at + m.len() - 1];
            let end = visible_starts
                .iter()
                .find(|&&s| s > last)
                .copied()
                .unwrap_or(text.len());
            begin..end
        })
        .collect()
}
