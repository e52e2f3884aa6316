//! Ordered filename pattern cascade.
//!
//! Each pattern recognizes one filename convention used by karaoke disc
//! publishers. The order of [`cascade`] is the dispatch logic: the first
//! pattern whose regex matches a cleaned stem decides the outcome, and a
//! match that fails validation makes the stem unparseable rather than falling
//! through to looser patterns. That is what lets the "antipattern" shapes
//! (bare disc-track, number-dash-title, ...) claim ambiguous stems before the
//! generic "performer - title" pattern can mis-capture them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{canonical_name, pad_track, CandidateMatch};
use crate::normalize::title_case;

/// Minimum canonical-length / stem-length ratio for an accepted match.
pub const MIN_LENGTH_RATIO: f64 = 0.75;

// ============================================================================
// BUILDING BLOCKS
// ============================================================================

const DISCID: &str = r"(?P<disc>[A-Za-z0-9]+)";
const DISCID_UPPER: &str = r"(?P<disc>[A-Z0-9-]+)";
const TRACKNO: &str = r"(?P<track>\d+)";

// Leading "01 " / "15 " style numbers are not part of the performer.
const PERFORMER: &str = r"(?:0\d\d?\s|1\d\s)?(?P<performer>[^-]+)";
const PERFORMER_NO_DIGITS: &str = r"(?:0\d\d?\s|1\d\s)?(?P<performer>[^-0-9]+)";
const TITLE: &str = r"(?P<title>[^-]+)";

// For names that legitimately contain dashes; only usable between strict separators.
const PERFORMER_WITH_DASH: &str = r"(?P<performer>.+?)";
const TITLE_WITH_DASH: &str = r"(?P<title>.+?)";

const NUMBERS: &str = r"\d+";
const DASH: &str = r"\s*-\s*";
const OPT_DASH: &str = r"(?:\s+-?\s*|\s*-?\s+|-)";
const STRICT_DASH: &str = r"\s+-\s+";

/// One named rule in the cascade.
pub struct Pattern {
    pub name: &'static str,
    pub regex: Regex,
    /// Shapes included only so they fail fast (they capture no performer).
    pub antipattern: bool,
}

fn pattern(name: &'static str, source: String) -> Pattern {
    let regex = Regex::new(&source).unwrap();
    let antipattern = regex.capture_names().flatten().all(|n| n != "performer");
    Pattern {
        name,
        regex,
        antipattern,
    }
}

static CASCADE: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let d_n = format!("{DISCID}-{TRACKNO}");
    vec![
        // "SC8101-01 - 01 - My Way"
        pattern("D_N_NUM_T", format!(r"^{d_n}{STRICT_DASH}\d\d{DASH}{TITLE}$")),
        // "SC8101-01 - 01 - Sinatra, Frank - My Way"
        pattern(
            "D_N_NUM_P_T",
            format!(r"^{d_n}{OPT_DASH}{NUMBERS}{DASH}{PERFORMER}{DASH}{TITLE}$"),
        ),
        // "SC8101-01-01 Sinatra, Frank - My Way"
        pattern(
            "D_N_N_P_T",
            format!(r"^{d_n}-{NUMBERS}{OPT_DASH}{PERFORMER}{DASH}{TITLE}$"),
        ),
        // "SC8101-01-01-01 - Sinatra, Frank - My Way"
        pattern(
            "D_N_N_N_P_T",
            format!(r"^{d_n}-{NUMBERS}-{NUMBERS}{DASH}{PERFORMER}{DASH}{TITLE}$"),
        ),
        // "SC8101-01 - Sinatra, Frank - My Way"
        pattern(
            "D_N_P_T",
            format!(r"^{d_n}{OPT_DASH}{PERFORMER}{DASH}{TITLE}$"),
        ),
        // "Sinatra, Frank - My Way - SC8101-01"
        pattern(
            "P_T_D_N",
            format!(r"^{PERFORMER}{DASH}{TITLE}{DASH}{d_n}$"),
        ),
        // "sf252-02"
        pattern("D_N", format!(r"^{d_n}$")),
        // "02-Your Song"
        pattern("N_T", format!(r"^{NUMBERS}{DASH}{TITLE}$")),
        // "Sinatra, Frank - My Way"
        pattern("P_T", format!(r"^{PERFORMER}{DASH}{TITLE}$")),
        // "CBE3-16 - 03 - Eddie Fisher - Oh My Pa-Pa"
        pattern(
            "D_N_NUM_P_T_DASHED",
            format!(
                r"^{d_n}{STRICT_DASH}\d\d{STRICT_DASH}{PERFORMER_WITH_DASH}{STRICT_DASH}{TITLE_WITH_DASH}$"
            ),
        ),
        // "Cbe2-28 - Third Eye Blind - Semi-Charmed Life"
        pattern(
            "D_N_P_T_DASHED",
            format!(r"^{d_n}{STRICT_DASH}{PERFORMER_WITH_DASH}{STRICT_DASH}{TITLE_WITH_DASH}$"),
        ),
        // "Cbe2-28-09 - Third Eye Blind - Semi-Charmed Life"
        pattern(
            "D_N_N_P_T_DASHED",
            format!(
                r"^{d_n}-{NUMBERS}{STRICT_DASH}{PERFORMER_WITH_DASH}{STRICT_DASH}{TITLE_WITH_DASH}$"
            ),
        ),
        // "15 - Super Duper - Stone, Joss"
        pattern(
            "NUM_P_T",
            format!(r"^{NUMBERS}{STRICT_DASH}{PERFORMER}{STRICT_DASH}{TITLE}$"),
        ),
        // "System Of A Down - Prison Song - G11249"
        pattern(
            "P_T_D",
            format!(r"^{PERFORMER_NO_DIGITS}{DASH}{TITLE}{DASH}{DISCID_UPPER}$"),
        ),
        // "SPC018 - 07 - Creed - One Last Breath"
        pattern(
            "D_NUM_P_T_SPACED",
            format!(r"^{DISCID}{STRICT_DASH}\d\d{STRICT_DASH}{PERFORMER}{STRICT_DASH}{TITLE}$"),
        ),
        // "CBE314 - 01 - Do The Hokey Pokey"
        pattern(
            "D_NUM_T",
            format!(r"^{DISCID}[-0-9]+{STRICT_DASH}\d\d{STRICT_DASH}{TITLE}$"),
        ),
        // "CBE314 - Creed - One Last Breath"
        pattern(
            "D_P_T",
            format!(r"^{DISCID}[-0-9]+{STRICT_DASH}{PERFORMER}{STRICT_DASH}{TITLE}$"),
        ),
        // "CBE113 - 02 - Duet (Hill - Mcgraw) - Its Your Love"
        pattern(
            "D_NUM_P_T_DASHED",
            format!(
                r"^{DISCID}{STRICT_DASH}{NUMBERS}{STRICT_DASH}{PERFORMER_WITH_DASH}{STRICT_DASH}{TITLE}$"
            ),
        ),
        // "ASK-65A-02 - 01 - Keys, Alicia - Karma"
        pattern(
            "D_N_NUM_P_T_LOOSE",
            format!(r"^{DISCID_UPPER}-{TRACKNO}{DASH}{NUMBERS}{DASH}{PERFORMER}{DASH}{TITLE}$"),
        ),
        // "ASK-65A-02 - Keys, Alicia - Karma"
        pattern(
            "D_N_P_T_LOOSE",
            format!(r"^{DISCID_UPPER}-{TRACKNO}{DASH}{PERFORMER_NO_DIGITS}{DASH}{TITLE}$"),
        ),
    ]
});

/// The ordered cascade, for diagnostics.
pub fn cascade() -> &'static [Pattern] {
    &CASCADE
}

// ============================================================================
// MATCHING
// ============================================================================

/// Why the deciding pattern's captures were thrown away.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MissingPerformer,
    MissingTitle,
    TooShort { ratio: f64 },
}

/// Full account of how the cascade treated one stem.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(CandidateMatch),
    Rejected {
        pattern: &'static str,
        reason: Rejection,
    },
    NoMatch,
}

fn non_blank(value: Option<regex::Match<'_>>) -> Option<String> {
    value
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Canonical name length relative to the stem it was recovered from.
/// Synthetic disc ids are not known yet, so without a captured disc the
/// `DISCID-TRACK - ` prefix is left out of the measurement.
fn length_ratio(stem: &str, candidate: &CandidateMatch) -> f64 {
    let canonical = match &candidate.disc {
        Some(disc) => canonical_name(
            disc,
            &pad_track(candidate.track.as_deref()),
            &candidate.performer,
            &candidate.title,
        ),
        None => format!(
            "{} - {}",
            title_case(&candidate.performer),
            title_case(&candidate.title)
        ),
    };
    let original = stem.chars().count().max(1);
    canonical.chars().count() as f64 / original as f64
}

/// Run the cascade over a cleaned stem and report the verdict.
pub fn explain(stem: &str) -> Verdict {
    let Some((pattern, caps)) = CASCADE
        .iter()
        .find_map(|p| p.regex.captures(stem).map(|caps| (p, caps)))
    else {
        return Verdict::NoMatch;
    };

    let reject = |reason| Verdict::Rejected {
        pattern: pattern.name,
        reason,
    };
    let Some(performer) = non_blank(caps.name("performer")) else {
        return reject(Rejection::MissingPerformer);
    };
    let Some(title) = non_blank(caps.name("title")) else {
        return reject(Rejection::MissingTitle);
    };

    let candidate = CandidateMatch {
        pattern: pattern.name,
        disc: non_blank(caps.name("disc")),
        track: non_blank(caps.name("track")),
        performer,
        title,
    };
    let ratio = length_ratio(stem, &candidate);
    if ratio < MIN_LENGTH_RATIO {
        return reject(Rejection::TooShort { ratio });
    }
    Verdict::Accepted(candidate)
}

/// Disc id for a match that captured none: `XX`, the first alphanumeric
/// character of the raw performer and of the raw title, then `0`.
/// Derived from the filename alone so re-runs land on the same name.
pub fn synthetic_disc_id(performer: &str, title: &str) -> String {
    let first = |s: &str| s.chars().find(|c| c.is_alphanumeric());
    let mut id = String::from("XX");
    id.extend(first(performer));
    id.extend(first(title));
    id.push('0');
    id.to_uppercase()
}

/// First accepted match for a cleaned stem, or `None` if it is unparseable.
pub fn match_stem(stem: &str) -> Option<CandidateMatch> {
    match explain(stem) {
        Verdict::Accepted(candidate) => Some(candidate),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
