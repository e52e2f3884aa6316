//! Karaoke collection fixer - shared modules for both binaries.

pub mod archive;
pub mod catalog;
pub mod dedupe;
pub mod models;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod relocate;
pub mod safety;
pub mod scan;
