use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;

use songbook_fix::pipeline::{run, RunOptions};
use songbook_fix::progress::{format_duration, set_log_only};
use songbook_fix::reconcile::ReconcileOptions;

#[derive(Parser)]
#[command(name = "songbook-fix")]
#[command(about = "Rename, deduplicate and reorganize a karaoke collection into a canonical song book")]
struct Args {
    /// Collection to read
    source: PathBuf,

    /// Root of the reorganized collection (may equal SOURCE)
    dest: PathBuf,

    /// Move files instead of copying, and delete originals after repacking
    #[arg(long)]
    delete: bool,

    /// Swap performer and title on buckets whose titles are performer names (lossy)
    #[arg(long)]
    flip: bool,

    /// Merge near-identical performer names that share titles
    #[arg(long)]
    merge: bool,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Skip writing the #Song Book catalog
    #[arg(long)]
    no_catalog: bool,

    /// Parser threads (0 = one per core)
    #[arg(long, default_value = "0")]
    workers: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let options = RunOptions {
        delete: args.delete,
        reconcile: ReconcileOptions {
            flip: args.flip,
            merge: args.merge,
        },
        write_catalog: !args.no_catalog,
    };
    let stats = run(&args.source, &args.dest, &options)?;

    if let Some(path) = &args.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    println!("\n{:=<60}", "");
    println!("Reorganization complete!");
    println!("  Media files:   {}", stats.scan.media_files);
    println!("  Parsed:        {}", stats.scan.parsed);
    println!("  Unparseable:   {}", stats.scan.unparseable);
    println!("  Performers:    {}", stats.reconcile.performers_out);
    println!("  Copied/moved:  {}", stats.relocate.copied + stats.relocate.moved);
    println!("  Repacked:      {}", stats.relocate.repacked);
    println!("  Duplicates:    {}", stats.relocate.duplicates);
    println!(
        "  Skipped:       {}",
        stats.relocate.skipped_same_path + stats.relocate.skipped_existing
    );
    if stats.relocate.broken_archives > 0 {
        println!("  Bad archives:  {}", stats.relocate.broken_archives);
    }
    if stats.relocate.conflicts + stats.relocate.failures > 0 {
        println!(
            "  Errors:        {}",
            stats.relocate.conflicts + stats.relocate.failures
        );
    }
    println!(
        "  Elapsed:       {}",
        format_duration(std::time::Duration::from_secs_f64(stats.elapsed_seconds))
    );
    println!("{:=<60}", "");

    Ok(())
}
