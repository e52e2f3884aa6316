//! Song-book reconciliation.
//!
//! Fixups run in a fixed order over the whole book, since each one needs
//! every performer key to be visible:
//!
//! 1. drop performers with no entries,
//! 2. fold "x" into "x, the" when both exist,
//! 3. (opt-in) re-file buckets whose "titles" are really performer names,
//! 4. (opt-in) merge performers whose names are near-identical and who share
//!    a good part of their titles.

use rustc_hash::{FxHashMap, FxHashSet};
use strsim::levenshtein;

use crate::models::{ReconcileReport, SongBook, SongEntry};
use crate::normalize::{normalize_performer, strip_the, to_title_form};

/// Length difference and edit distance allowed between two names, relative
/// to the shorter name.
pub const NAME_DISTANCE_RATIO: f64 = 0.2;

/// Share of the smaller title set two performers must have in common.
pub const MIN_SHARED_TITLES: f64 = 0.30;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Swap performer and title on buckets that look inverted.
    pub flip: bool,
    /// Merge near-identical performer names.
    pub merge: bool,
}

pub fn drop_empty_performers(book: &mut SongBook) -> usize {
    let before = book.len();
    book.retain(|_, entries| !entries.is_empty());
    before - book.len()
}

fn assign_performer(entries: &mut [SongEntry], performer: &str) {
    for entry in entries {
        entry.performer = Some(performer.to_string());
    }
}

/// "beatles" and "beatles, the" are the same performer; keep the latter.
pub fn merge_the_variants(book: &mut SongBook) -> usize {
    let keys: Vec<String> = book.keys().cloned().collect();
    let mut merged = 0;
    for key in keys {
        let variant = format!("{}, the", key);
        if !book.contains_key(&variant) {
            continue;
        }
        let Some(mut entries) = book.remove(&key) else {
            continue;
        };
        assign_performer(&mut entries, &variant);
        log::info!("combining {} < {}", variant, key);
        let bucket = book.entry(variant).or_default();
        entries.append(bucket);
        *bucket = entries;
        merged += 1;
    }
    merged
}

/// Existing key a title names when read as a performer. The ", the" form
/// wins over the bare form.
fn performer_named_by(title: &str, book: &SongBook, exclude: &str) -> Option<String> {
    let name = normalize_performer(title);
    let with_the = format!("{}, the", name);
    [with_the, name]
        .into_iter()
        .find(|candidate| candidate != exclude && book.contains_key(candidate))
}

/// Targets for every entry of `key` if the whole bucket is inverted.
fn plan_flip(key: &str, book: &SongBook) -> Option<Vec<String>> {
    let entries = book.get(key)?;
    if entries.is_empty() {
        return None;
    }
    entries
        .iter()
        .map(|entry| {
            let target = performer_named_by(entry.title.as_deref()?, book, key)?;
            let bigger = book.get(&target).map_or(0, Vec::len) > entries.len();
            bigger.then_some(target)
        })
        .collect()
}

/// Re-file buckets where every title is the name of a larger performer,
/// e.g. "my way" by "frank sinatra" filed as performer "my way". Lossy, so
/// only run on request. Buckets that receive flipped entries are never
/// flipped themselves.
pub fn fix_swapped_fields(book: &mut SongBook) -> usize {
    let plans: Vec<(String, Vec<String>)> = book
        .keys()
        .filter_map(|key| plan_flip(key, book).map(|targets| (key.clone(), targets)))
        .collect();
    let receivers: FxHashSet<&str> = plans
        .iter()
        .flat_map(|(_, targets)| targets.iter().map(String::as_str))
        .collect();
    let plans: Vec<&(String, Vec<String>)> = plans
        .iter()
        .filter(|(key, _)| !receivers.contains(key.as_str()))
        .collect();

    for (key, targets) in &plans {
        let Some(entries) = book.remove(key) else {
            continue;
        };
        for (mut entry, target) in entries.into_iter().zip(targets) {
            log::info!("should be performer: {} title: {}", target, key);
            entry.title = Some(to_title_form(key));
            entry.performer = Some(target.clone());
            book.entry(target.clone()).or_default().push(entry);
        }
    }
    plans.len()
}

/// What fuzzy matching needs to know about one performer.
struct Profile {
    key: String,
    stripped: String,
    titles: FxHashSet<String>,
    entries: usize,
}

impl Profile {
    fn new(key: &str, entries: &[SongEntry]) -> Self {
        Profile {
            key: key.to_string(),
            stripped: strip_the(key).to_string(),
            titles: entries.iter().filter_map(|e| e.title.clone()).collect(),
            entries: entries.len(),
        }
    }
}

fn shared_title_ratio(a: &Profile, b: &Profile) -> f64 {
    let smaller = a.titles.len().min(b.titles.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = a.titles.intersection(&b.titles).count();
    shared as f64 / smaller as f64
}

fn is_word_reversal(a: &str, b: &str) -> bool {
    a.split_whitespace()
        .eq(b.split_whitespace().rev())
}

fn are_same_performer(a: &Profile, b: &Profile) -> bool {
    let len_a = a.stripped.chars().count();
    let len_b = b.stripped.chars().count();
    let threshold = NAME_DISTANCE_RATIO * len_a.min(len_b) as f64;
    if len_a.abs_diff(len_b) as f64 > threshold {
        return false;
    }
    if shared_title_ratio(a, b) < MIN_SHARED_TITLES {
        return false;
    }
    is_word_reversal(&a.stripped, &b.stripped)
        || levenshtein(&a.stripped, &b.stripped) as f64 <= threshold
}

/// Greedy clustering in key order: each unvisited key seeds a cluster and
/// pulls in every later unvisited key that matches the seed. The member
/// with the most entries (earliest on ties) names the cluster.
pub fn merge_similar_performers(book: &mut SongBook) -> usize {
    let profiles: Vec<Profile> = book
        .iter()
        .map(|(key, entries)| Profile::new(key, entries))
        .collect();
    let mut visited = vec![false; profiles.len()];
    let mut renames: FxHashMap<String, String> = FxHashMap::default();

    for seed in 0..profiles.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut cluster = vec![seed];
        for other in seed + 1..profiles.len() {
            if !visited[other] && are_same_performer(&profiles[seed], &profiles[other]) {
                visited[other] = true;
                cluster.push(other);
            }
        }
        if cluster.len() < 2 {
            continue;
        }

        let canonical = cluster.iter().copied().fold(seed, |best, i| {
            if profiles[i].entries > profiles[best].entries {
                i
            } else {
                best
            }
        });
        let members: Vec<&str> = cluster.iter().map(|&i| profiles[i].key.as_str()).collect();
        log::info!("combining {} < {:?}", profiles[canonical].key, members);
        for &i in &cluster {
            if i != canonical {
                renames.insert(profiles[i].key.clone(), profiles[canonical].key.clone());
            }
        }
    }

    for (from, to) in &renames {
        let Some(mut entries) = book.remove(from) else {
            continue;
        };
        assign_performer(&mut entries, to);
        book.entry(to.clone()).or_default().append(&mut entries);
    }
    renames.len()
}

/// Run every fixup in order and report what changed.
pub fn reconcile(book: &mut SongBook, options: &ReconcileOptions) -> ReconcileReport {
    let mut report = ReconcileReport {
        performers_in: book.len(),
        ..Default::default()
    };
    log::info!("song book has {} performers", report.performers_in);

    report.empty_dropped = drop_empty_performers(book);
    log::info!("removed {} empty performers", report.empty_dropped);

    report.the_variants_merged = merge_the_variants(book);
    log::info!("merged {} \", the\" performers", report.the_variants_merged);

    if options.flip {
        report.flipped = fix_swapped_fields(book);
        log::info!("flipped {} swapped performers", report.flipped);
    }
    if options.merge {
        report.fuzzy_merged = merge_similar_performers(book);
        log::info!("merged {} similar performers", report.fuzzy_merged);
    }

    report.performers_out = book.len();
    report.entries_out = book.values().map(Vec::len).sum();
    log::info!(
        "updated song book has {} performers, {} songs",
        report.performers_out,
        report.entries_out
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn song(performer: &str, title: &str) -> SongEntry {
        SongEntry {
            disc: "SC1".to_string(),
            synthetic_disc: false,
            track: "01".to_string(),
            performer: Some(performer.to_string()),
            title: Some(title.to_string()),
            ext: ".mp3".to_string(),
            dir: PathBuf::from("/music"),
            file_name: format!("{} - {}.mp3", performer, title),
            stem: format!("{} - {}", performer, title),
            fallback_stem: format!("{} - {}", performer, title),
            pattern: Some("P_T"),
        }
    }

    fn book(songs: &[(&str, &str)]) -> SongBook {
        let mut book = SongBook::new();
        for (performer, title) in songs {
            book.entry(performer.to_string())
                .or_default()
                .push(song(performer, title));
        }
        book
    }

    fn titles(book: &SongBook, performer: &str) -> Vec<String> {
        book[performer]
            .iter()
            .filter_map(|e| e.title.clone())
            .collect()
    }

    #[test]
    fn test_drop_empty_performers() {
        let mut b = book(&[("abba", "waterloo")]);
        b.insert("nobody".to_string(), Vec::new());
        assert_eq!(drop_empty_performers(&mut b), 1);
        assert!(!b.contains_key("nobody"));
    }

    #[test]
    fn test_merge_the_variants() {
        let mut b = book(&[("beatles", "help"), ("beatles, the", "yesterday")]);
        assert_eq!(merge_the_variants(&mut b), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(titles(&b, "beatles, the"), vec!["help", "yesterday"]);
        assert!(b["beatles, the"]
            .iter()
            .all(|e| e.performer.as_deref() == Some("beatles, the")));
    }

    #[test]
    fn test_fix_swapped_fields() {
        let mut b = book(&[
            ("frank sinatra", "my way"),
            ("frank sinatra", "new york new york"),
            ("my way", "frank sinatra"),
        ]);
        assert_eq!(fix_swapped_fields(&mut b), 1);
        assert!(!b.contains_key("my way"));
        assert_eq!(
            titles(&b, "frank sinatra"),
            vec!["my way", "new york new york", "my way"]
        );
    }

    #[test]
    fn test_flip_prefers_the_variant() {
        let mut b = book(&[
            ("beatles, the", "help"),
            ("beatles, the", "yesterday"),
            ("help", "beatles"),
        ]);
        assert_eq!(fix_swapped_fields(&mut b), 1);
        let moved = b["beatles, the"].last().unwrap();
        assert_eq!(moved.title.as_deref(), Some("help"));
        assert_eq!(moved.performer.as_deref(), Some("beatles, the"));
    }

    #[test]
    fn test_flip_needs_larger_target() {
        let mut b = book(&[("abba", "waterloo"), ("waterloo", "abba")]);
        assert_eq!(fix_swapped_fields(&mut b), 0);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_flip_needs_every_title() {
        let mut b = book(&[
            ("abba", "waterloo"),
            ("abba", "sos"),
            ("abba", "dancing queen"),
            ("waterloo", "abba"),
            ("waterloo", "not a performer"),
        ]);
        assert_eq!(fix_swapped_fields(&mut b), 0);
    }

    #[test]
    fn test_merge_one_edit_apart() {
        let mut b = book(&[
            ("aerosmith", "dream on"),
            ("aerosmith", "crazy"),
            ("aerosmit", "dream on"),
        ]);
        assert_eq!(merge_similar_performers(&mut b), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(b["aerosmith"].len(), 3);
        assert!(b["aerosmith"]
            .iter()
            .all(|e| e.performer.as_deref() == Some("aerosmith")));
    }

    #[test]
    fn test_merge_word_reversal() {
        let mut b = book(&[
            ("frank sinatra", "my way"),
            ("sinatra frank", "my way"),
            ("sinatra frank", "new york"),
        ]);
        assert_eq!(merge_similar_performers(&mut b), 1);
        // Most entries names the cluster
        assert!(b.contains_key("sinatra frank"));
        assert_eq!(b["sinatra frank"].len(), 3);
    }

    #[test]
    fn test_no_shared_titles_never_merge() {
        let mut b = book(&[("aerosmith", "dream on"), ("aerosmit", "crazy")]);
        assert_eq!(merge_similar_performers(&mut b), 0);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_length_gap_blocks_merge() {
        let mut b = book(&[
            ("abba", "waterloo"),
            ("abba", "sos"),
            ("abba band", "waterloo"),
            ("abba band", "sos"),
        ]);
        assert_eq!(merge_similar_performers(&mut b), 0);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_merge_tie_goes_to_first_key() {
        let mut b = book(&[("madonna", "vogue"), ("madona", "vogue")]);
        assert_eq!(merge_similar_performers(&mut b), 1);
        // "madona" sorts first
        assert!(b.contains_key("madona"));
    }

    #[test]
    fn test_reconcile_respects_options() {
        let mut b = book(&[
            ("aerosmith", "dream on"),
            ("aerosmit", "dream on"),
            ("beatles", "help"),
            ("beatles, the", "yesterday"),
        ]);
        let report = reconcile(&mut b, &ReconcileOptions::default());
        assert_eq!(report.performers_in, 4);
        assert_eq!(report.the_variants_merged, 1);
        assert_eq!(report.fuzzy_merged, 0);
        assert_eq!(report.performers_out, 3);
        assert_eq!(report.entries_out, 4);

        let options = ReconcileOptions {
            flip: false,
            merge: true,
        };
        let report = reconcile(&mut b, &options);
        assert_eq!(report.fuzzy_merged, 1);
        assert_eq!(report.performers_out, 2);
    }
}
