use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use catalog_match::catalog::load_catalog_page;
use catalog_match::merge::{merge_dirs, MergeOptions};
use catalog_match::models::MatchReport;
use catalog_match::progress::{format_duration, set_log_only};
use catalog_match::reconcile::{clear_cache, clear_manual, update_file_meta, MatchSession};
use catalog_match::safety::validate_report_path;
use catalog_match::tags::LoftyTagWriter;

#[derive(Parser, Debug)]
#[command(name = "catalog-match")]
#[command(about = "Correlate a directory of audio files with song catalog entries")]
struct Cli {
    /// Log-only mode: disable progress bars, emit plain log lines instead
    #[arg(long, global = true)]
    log_only: bool,

    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match the audio files of a directory against a catalog page
    Match {
        /// Directory of audio files
        dir: PathBuf,

        /// Catalog page (JSON array of catalog records)
        #[arg(long)]
        catalog: PathBuf,

        /// Write matching stats as JSON to this file
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Pin one file to a catalog id, overriding automatic matching
    Manual {
        /// Audio file to pin
        song: PathBuf,

        /// Catalog id to pin it to
        id: u64,

        /// Catalog page containing the record for `id`
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Re-read tags and hashes of every file tracked in a directory
    UpdateInfo { dir: PathBuf },

    /// Write matched catalog metadata (title, artists, album, track, disc,
    /// date) into the tags of every tracked file
    UpdateFileMeta { dir: PathBuf },

    /// Forget automatic matches (and the trashbin) of a directory
    ClearCache { dir: PathBuf },

    /// Forget manual matches of a directory
    ClearManual { dir: PathBuf },

    /// Move or copy matched files and their correlations into another directory
    Merge {
        /// Directory receiving the files
        target: PathBuf,

        /// Directory the files come from
        source: PathBuf,

        /// Copy instead of move
        #[arg(long)]
        copy: bool,

        /// Replace files already present in the target
        #[arg(long)]
        overwrite: bool,

        /// Only transfer audio files, not sidecars such as lyrics
        #[arg(long)]
        music_only: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn print_report(report: &MatchReport) {
    println!("\n{:=<60}", "");
    println!("Matching complete!");
    println!("  Total:        {}", report.total());
    println!("  Manual:       {}", report.manual);
    println!("  Cached:       {}", report.cached);
    println!("  New matches:  {}", report.matched);
    println!("  Unmatched:    {}", report.unmatched());
    println!("  Match rate:   {:.1}%", report.stats.match_rate());
    println!("{:=<60}", "");

    if !report.unmatched_files.is_empty() {
        println!("\nUnmatched files:");
        for name in &report.unmatched_files {
            println!("  - {}", name);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    set_log_only(cli.log_only);
    init_logging(cli.verbose);

    let start = Instant::now();

    match cli.cmd {
        Command::Match { dir, catalog, stats } => {
            if let Some(ref path) = stats {
                validate_report_path(path)?;
            }
            let page = load_catalog_page(&catalog)?;
            println!("Loaded {} catalog entries from {:?}", page.len(), catalog);

            let mut session = MatchSession::with_defaults();
            let report = session.run(&dir, &page)?;
            print_report(&report);

            if let Some(path) = stats {
                report
                    .stats
                    .write_to_file(&path)
                    .with_context(|| format!("failed to write stats to {}", path.display()))?;
                println!("Stats written to {:?}", path);
            }
        }
        Command::Manual { song, id, catalog } => {
            let page = load_catalog_page(&catalog)?;
            let session = MatchSession::with_defaults();
            let info = session.manual_match_file(&song, id, &page)?;
            println!("Pinned {} to catalog id {}", info.file_name, info.catalog_id);
        }
        Command::UpdateInfo { dir } => {
            let session = MatchSession::with_defaults();
            if let Some(count) = session.update_all_info(&dir)? {
                println!("Refreshed {} entries in {:?}", count, dir);
            }
        }
        Command::UpdateFileMeta { dir } => {
            if let Some(report) = update_file_meta(&dir, &LoftyTagWriter) {
                println!(
                    "Retagged {} files in {:?}: {} skipped, {} failed",
                    report.updated, dir, report.skipped, report.failed
                );
                println!("Run update-info to refresh the stored hashes");
            }
        }
        Command::ClearCache { dir } => {
            if clear_cache(&dir)? {
                println!("Cleared automatic matches in {:?}", dir);
            }
        }
        Command::ClearManual { dir } => {
            if clear_manual(&dir)? {
                println!("Cleared manual matches in {:?}", dir);
            }
        }
        Command::Merge {
            target,
            source,
            copy,
            overwrite,
            music_only,
        } => {
            let options = MergeOptions {
                copy,
                overwrite,
                music_only,
            };
            let report = merge_dirs(&target, &source, options)?;
            println!(
                "Merged {:?} into {:?}: {} transferred, {} skipped, {} failed",
                source, target, report.transferred, report.skipped, report.failed
            );
        }
    }

    println!("Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}
