//! Printable song book: performer -> titles, as JSON and as LaTeX markup.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedupe::{flatten_song_book, suppress_similar_titles};
use crate::models::SongBook;
use crate::normalize::title_case;

pub const SONG_BOOK_DIR: &str = "#Song Book";
pub const JSON_FILE: &str = "songbook.json";
pub const LATEX_FILE: &str = "songbook.tex";

/// Display form of the catalog: title-cased performer -> sorted, title-cased
/// titles with near-duplicates removed.
pub type Catalog = BTreeMap<String, Vec<String>>;

pub fn build_catalog(book: &SongBook) -> Catalog {
    let mut catalog = Catalog::new();
    for (performer, titles) in flatten_song_book(book) {
        let mut titles: Vec<String> = suppress_similar_titles(titles.as_slice())
            .iter()
            .map(|t| title_case(t))
            .collect();
        titles.sort();
        catalog
            .entry(title_case(&performer))
            .or_default()
            .extend(titles);
    }
    catalog
}

pub fn render_json(catalog: &Catalog) -> Result<String> {
    Ok(serde_json::to_string_pretty(catalog)?)
}

/// Escape the characters LaTeX treats as markup.
pub fn latex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn render_latex(catalog: &Catalog) -> String {
    let mut out = String::new();
    for (performer, titles) in catalog {
        let _ = writeln!(out, "\\artistsection{{{}}}", latex_escape(performer));
        out.push_str("\\begin{songlist}\n");
        for title in titles {
            let _ = writeln!(out, "\\item {}", latex_escape(title));
        }
        out.push_str("\\end{songlist}\n\n");
    }
    out
}

/// Write both catalog files under `<root>/#Song Book`. Returns the catalog
/// directory.
pub fn write_catalog(root: &Path, catalog: &Catalog) -> Result<PathBuf> {
    let dir = root.join(SONG_BOOK_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let json_path = dir.join(JSON_FILE);
    fs::write(&json_path, render_json(catalog)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    let latex_path = dir.join(LATEX_FILE);
    fs::write(&latex_path, render_latex(catalog))
        .with_context(|| format!("Failed to write {}", latex_path.display()))?;

    log::info!(
        "wrote song book with {} performers to {}",
        catalog.len(),
        dir.display()
    );
    Ok(dir)
}
