//! Near-duplicate title suppression for the catalog.
//!
//! The same song often shows up under several spellings ("hey jude",
//! "hey jud", "bohemian rhapsody (live version)"). Per performer the first
//! variant seen is kept and later variants that are similar to any kept
//! title are dropped.

use std::collections::BTreeMap;
use strsim::levenshtein;

use crate::models::SongBook;
use crate::normalize::strip_the;

/// Cosmetic tags that never distinguish two songs. Stripped for comparison
/// and from the returned titles.
pub const COSMETIC_SUFFIXES: &[&str] = &[
    "(remix)",
    "(duet)",
    "(wvocals)",
    "(radio version)",
    "[sc]",
    "(mpx)",
];

/// Shared-prefix rule: the common prefix must be longer than this.
const MIN_SHARED_PREFIX: usize = 8;

pub fn strip_cosmetic_suffixes(title: &str) -> String {
    let mut title = title.trim();
    loop {
        let next = COSMETIC_SUFFIXES
            .iter()
            .find_map(|suffix| title.strip_suffix(suffix))
            .map(str::trim);
        match next {
            Some(next) => title = next,
            None => return title.to_string(),
        }
    }
}

/// One title is the start of the other, the shared part is long, and the
/// shorter one is more than half the length of the longer one.
fn shares_prefix(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.trim().chars().collect();
    let b: Vec<char> = b.trim().chars().collect();
    let min_len = a.len().min(b.len());
    let max_len = a.len().max(b.len());
    min_len > MIN_SHARED_PREFIX
        && a[..min_len] == b[..min_len]
        && min_len as f64 / max_len as f64 > 0.5
}

pub fn is_similar_title(a: &str, b: &str) -> bool {
    let a = strip_the(a);
    let b = strip_the(b);
    if shares_prefix(a, b) {
        return true;
    }
    let max_len = a.chars().count().max(b.chars().count());
    levenshtein(a, b) as f64 <= 1.0 + 0.14 * max_len as f64
}

/// Keep the first of every group of similar titles, in input order.
pub fn suppress_similar_titles<S: AsRef<str>>(titles: &[S]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for title in titles {
        let title = strip_cosmetic_suffixes(title.as_ref());
        if !kept.iter().any(|other| is_similar_title(&title, other)) {
            kept.push(title);
        }
    }
    kept
}

/// Performer key -> titles of its entries, in entry order.
pub fn flatten_song_book(book: &SongBook) -> BTreeMap<String, Vec<String>> {
    book.iter()
        .map(|(performer, entries)| {
            let titles = entries
                .iter()
                .filter_map(|entry| entry.title.clone())
                .collect();
            (performer.clone(), titles)
        })
        .collect()
}
