//! Locating trigger phrases inside submitted copy.
//!
//! Offsets are counted in characters (Unicode scalar values) so they line up
//! with how clients index the text they submitted. [`find_all_bytes`] gives
//! the same spans in byte offsets for slicing on the Rust side.
//!
//! # Algorithm
//!
//! 1. Trim the needle; bail out with no spans if it or the haystack is empty
//! 2. Search left to right, resuming at the end of the previous match
//! 3. Matches therefore never overlap, and repeated calls give identical output

use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice `text` by this span, interpreting it as character offsets.
    pub fn slice_chars<'a>(&self, text: &'a str) -> Option<&'a str> {
        let mut indices = text.char_indices().map(|(i, _)| i).chain([text.len()]);
        let start = indices.nth(self.start)?;
        let end = if self.is_empty() {
            start
        } else {
            indices.nth(self.len() - 1)?
        };
        text.get(start..end)
    }
}

/// Where a highlighted phrase sits in the source text.
///
/// `NotFound` is kept rather than dropping the highlight when a model-reported
/// trigger phrase does not literally occur in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Location {
    Found { start: usize, end: usize },
    NotFound,
}

impl Location {
    /// One location per occurrence of `phrase`, or a single `NotFound`.
    pub fn locate_all(text: &str, phrase: &str) -> Vec<Location> {
        let spans = find_all(text, phrase);
        if spans.is_empty() {
            return vec![Location::NotFound];
        }
        spans
            .into_iter()
            .map(|s| Location::Found {
                start: s.start,
                end: s.end,
            })
            .collect()
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Location::Found { .. })
    }

    /// `(start, end)` with `-1` for both when not found.
    pub fn bounds(&self) -> (i64, i64) {
        match *self {
            Location::Found { start, end } => (start as i64, end as i64),
            Location::NotFound => (-1, -1),
        }
    }
}

/// All non-overlapping occurrences of `needle` in `haystack`, in character offsets.
pub fn find_all(haystack: &str, needle: &str) -> Vec<Span> {
    let byte_spans = find_all_bytes(haystack, needle);
    if byte_spans.is_empty() {
        return byte_spans;
    }

    // Convert incrementally: count characters between consecutive matches.
    let needle_chars = needle.trim().chars().count();
    let mut out = Vec::with_capacity(byte_spans.len());
    let mut prev_byte = 0usize;
    let mut prev_char = 0usize;
    for span in byte_spans {
        let start = prev_char + haystack[prev_byte..span.start].chars().count();
        let end = start + needle_chars;
        out.push(Span { start, end });
        prev_byte = span.end;
        prev_char = end;
    }
    out
}

/// All non-overlapping occurrences of `needle` in `haystack`, in byte offsets.
pub fn find_all_bytes(haystack: &str, needle: &str) -> Vec<Span> {
    let needle = needle.trim();
    if needle.is_empty() || haystack.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut from = 0usize;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        spans.push(Span { start, end });
        from = end;
    }
    spans
}
