//! Normalization of performer and title text.
//!
//! `clean_words` is the case-preserving cleanup applied to a raw filename
//! stem before the pattern cascade. `normalize_performer` and
//! `normalize_title` produce the canonical keys used by reconciliation.
//! Both normalizers are idempotent; the tests below check that.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Marker phrase rules applied to the raw performer and title. On a match the
/// marker is removed from both fields and the tag is appended to the title.
static TAG_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // Vocal-accompaniment variants: "(vocals)", "(w-vocal)", "wvocals"
        (
            Regex::new(
                r"(?i)(\(vocal\)|\(vocals\)|\(wvocal\)|\(wvocals\)|\(w-vocal\)|\(w-vocals\)|wvocal|wvocals|w-vocal|w-vocals)",
            )
            .unwrap(),
            "(wvocals)",
        ),
        // Duet variants: "(duet version)", "(duet)", bare " duet "
        (
            Regex::new(r"(?i)(\(duet version\)|\(duet\)| duet )").unwrap(),
            "(duet)",
        ),
        (Regex::new(r"(?i)(\(christmas\))").unwrap(), "(christmas)"),
    ]
});

/// Words kept lower-case by `title_case` unless they open or close the text.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "if", "in", "is", "nor", "of", "on", "or",
    "so", "the", "to", "up", "yet",
];

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn collapse_whitespace(s: &str) -> String {
    MULTI_SPACE.replace_all(s, " ").trim().to_string()
}

/// Trim whitespace and trailing commas until neither is left.
fn tidy(s: &str) -> String {
    collapse_whitespace(s)
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}

/// Map apostrophe look-alikes (curly quotes, modifier letter, acute accent,
/// backtick, UTF-8 mojibake) to a plain apostrophe.
fn unify_apostrophes(s: &str) -> String {
    s.replace("â€™", "'")
        .replace(['\u{2018}', '\u{2019}', '\u{02BC}', '\u{00B4}', '`'], "'")
}

/// "rockin' robin" -> "rocking robin"
fn expand_elided_ing(s: &str) -> String {
    format!(" {} ", s).replace("in' ", "ing ")
}

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "Björk" → "bjork"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

// ============================================================================
// CLEANUP
// ============================================================================

/// Case-preserving cleanup applied to a filename stem before pattern matching.
/// Structural hyphens are left alone for the cascade to consume.
pub fn clean_words(text: &str) -> String {
    let text = text.trim_end_matches(',').replace('_', " ");
    let text = collapse_whitespace(&text);
    let text = unify_apostrophes(&text)
        .replace(['!', '.'], "")
        .replace('&', "and")
        .replace('$', "s");
    let text = expand_elided_ing(&text).replace('\'', "");
    tidy(&text)
}

/// Shared performer/title normalization: lower-case, clean, hyphens to spaces.
pub fn normalize_text(text: &str) -> String {
    let cleaned = clean_words(&text.to_lowercase());
    tidy(&cleaned.replace('-', " "))
}

// ============================================================================
// "THE" HANDLING
// ============================================================================

/// Drop a trailing ", the" / " the" or a leading "the " (first that applies).
pub fn strip_the(name: &str) -> &str {
    if let Some(rest) = name.strip_suffix(", the") {
        rest
    } else if let Some(rest) = name.strip_suffix(" the") {
        rest
    } else if let Some(rest) = name.strip_prefix("the ") {
        rest
    } else {
        name
    }
}

/// Performer form always carries "the" at the end: "the beatles" -> "beatles, the".
pub fn to_performer_form(name: &str) -> String {
    // Repeat until stable so "x the the" and "x, the" land on the same key.
    let mut stripped = name;
    loop {
        let next = strip_the(stripped);
        if next.len() == stripped.len() {
            break;
        }
        stripped = next;
    }
    if stripped.len() != name.len() {
        format!("{}, the", stripped)
    } else {
        name.to_string()
    }
}

/// Title form carries "the" at the front: "sound of silence, the" -> "the sound of silence".
pub fn to_title_form(name: &str) -> String {
    if name.starts_with("the ") {
        return name.to_string();
    }
    match name
        .strip_suffix(", the")
        .or_else(|| name.strip_suffix(" the"))
    {
        Some(rest) => format!("the {}", rest).trim_end().to_string(),
        None => name.to_string(),
    }
}

/// "sinatra, frank" -> "frank sinatra"; "hall, daryl and john oates" ->
/// "daryl hall and john oates". Only a single comma is rewritten, and
/// "beatles, the" is left for `to_performer_form`.
pub fn fix_last_comma_first(name: &str) -> String {
    let parts: Vec<&str> = name.split(',').collect();
    if parts.len() != 2 {
        return name.to_string();
    }
    let last = parts[0].trim();
    let rest = parts[1].trim();
    if rest == "the" {
        return name.to_string();
    }
    let words: Vec<&str> = match rest.split_once(" and ") {
        Some((first, others)) => vec![first.trim(), last, "and", others.trim()],
        None => vec![rest, last],
    };
    words
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a performer into its song-book key.
pub fn normalize_performer(performer: &str) -> String {
    let name = normalize_text(performer);
    let name = fix_last_comma_first(&name);
    to_performer_form(&name)
}

/// Normalize a title.
pub fn normalize_title(title: &str) -> String {
    to_title_form(&normalize_text(title))
}

/// Move vocal/duet/christmas markers out of the raw performer and title and
/// into a normalized tag at the end of the title.
pub fn apply_tags(performer: &str, title: &str) -> (String, String) {
    let mut performer = performer.trim().to_string();
    let mut title = title.trim().to_string();
    for (pattern, tag) in TAG_RULES.iter() {
        if !pattern.is_match(&performer) && !pattern.is_match(&title) {
            continue;
        }
        performer = collapse_whitespace(&pattern.replace_all(&performer, " "));
        let stripped = collapse_whitespace(&pattern.replace_all(&title, " "));
        title = format!("{} {}", stripped, tag).trim().to_string();
    }
    (performer, title)
}

// ============================================================================
// DISPLAY
// ============================================================================

fn capitalize(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut seen_alnum = false;
    for c in word.chars() {
        if !seen_alnum && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            seen_alnum = true;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Display casing for directory names, filenames and the catalog.
/// "the sound of silence" -> "The Sound of Silence"
pub fn title_case(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i != 0 && i != last && SMALL_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-case ASCII initial used as the top-level directory for a performer.
/// Falls back to "#" when the name starts with nothing foldable.
pub fn initial_letter(performer: &str) -> String {
    performer
        .trim()
        .chars()
        .next()
        .map(|c| fold_to_ascii(&c.to_string()))
        .and_then(|folded| folded.chars().next())
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_else(|| "#".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
