//! Show how the pattern cascade reads filenames.
//!
//! Usage: explain [FILENAME]...    (reads one filename per line from stdin
//! when none are given)

use anyhow::Result;
use std::io::{self, BufRead};
use std::path::Path;

use songbook_fix::normalize::{apply_tags, clean_words, normalize_performer, normalize_title};
use songbook_fix::patterns::{cascade, explain, synthetic_disc_id, Rejection, Verdict};
use songbook_fix::scan::{classify, FileKind};

fn explain_one(name: &str) {
    let path = Path::new(name.trim());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = clean_words(&stem);

    println!("{}", name.trim());
    if classify(path) != FileKind::Media {
        println!("  (not a media file; a run would ignore it)");
    }
    println!("  cleaned:   {}", cleaned);

    match explain(&cleaned) {
        Verdict::Accepted(candidate) => {
            let (performer, title) = apply_tags(&candidate.performer, &candidate.title);
            let disc = candidate
                .disc
                .clone()
                .unwrap_or_else(|| synthetic_disc_id(&candidate.performer, &candidate.title));
            println!("  pattern:   {}", candidate.pattern);
            println!(
                "  disc:      {}{}",
                disc,
                if candidate.disc.is_none() { " (synthetic)" } else { "" }
            );
            println!("  track:     {}", candidate.track.as_deref().unwrap_or("-"));
            println!("  performer: {:?} -> {:?}", candidate.performer, normalize_performer(&performer));
            println!("  title:     {:?} -> {:?}", candidate.title, normalize_title(&title));
        }
        Verdict::Rejected { pattern, reason } => {
            let why = match reason {
                Rejection::MissingPerformer => "no performer".to_string(),
                Rejection::MissingTitle => "no title".to_string(),
                Rejection::TooShort { ratio } => format!("canonical name too short ({:.2})", ratio),
            };
            println!("  rejected:  {} ({})", pattern, why);
        }
        Verdict::NoMatch => println!("  rejected:  none of {} patterns match", cascade().len()),
    }
    println!();
}

fn main() -> Result<()> {
    let names: Vec<String> = std::env::args().skip(1).collect();
    if !names.is_empty() {
        names.iter().for_each(|name| explain_one(name));
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            explain_one(&line);
        }
    }
    Ok(())
}
