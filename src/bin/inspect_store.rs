//! Print a summary of a directory's correlation store as JSON
//! Usage: cargo run --release --bin inspect-store -- <dir> [--entries]

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use catalog_match::library::list_audio_files;
use catalog_match::store::{Store, StoreDocument};

#[derive(Parser)]
#[command(name = "inspect-store")]
#[command(about = "Summarize the match data stored in a directory")]
struct Args {
    dir: PathBuf,

    /// Include every stored entry, not just the counts
    #[arg(long)]
    entries: bool,
}

#[derive(Serialize)]
struct StoreSummary<'a> {
    dir: String,
    audio_files: usize,
    untracked_files: Vec<String>,
    automatic: usize,
    manual: usize,
    trashbin: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<&'a StoreDocument>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let store = Store::open(&args.dir);
    let listing = list_audio_files(&args.dir)?;
    let audio_files = listing.len();
    let untracked_files = listing
        .into_iter()
        .filter(|name| {
            !store.files().iter().any(|m| &m.file_name == name)
                && !store.manual_matches().iter().any(|m| &m.file_name == name)
        })
        .collect::<Vec<_>>();

    let summary = StoreSummary {
        dir: args.dir.display().to_string(),
        audio_files,
        untracked_files,
        automatic: store.files().len(),
        manual: store.manual_matches().len(),
        trashbin: store.trashbin().len(),
        store: args.entries.then(|| store.document()),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
