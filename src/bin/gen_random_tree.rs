//! gen-random-tree - populate a directory with a random fixture tree
//!
//! Usage: `gen-random-tree <MAX_DEPTH> <BRANCH> <ROOT> [--seed N]`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snapverify::TreeGenerator;

/// Create a random tree of files and directories under an existing root
#[derive(Parser, Debug)]
#[command(name = "gen-random-tree")]
#[command(version)]
struct Args {
    /// Maximum nesting depth (0 creates nothing)
    max_depth: u32,
    /// Entries created in every directory
    branch: u32,
    /// Existing directory to populate
    root: PathBuf,
    /// Seed for a reproducible tree (unseeded by default)
    #[arg(long)]
    seed: Option<u64>,
}

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let mut generator = match args.seed {
        Some(seed) => TreeGenerator::seeded(seed),
        None => TreeGenerator::from_entropy(),
    };
    let stats = generator
        .generate(args.max_depth, args.branch, &args.root)
        .with_context(|| format!("Failed to generate tree under {}", args.root.display()))?;

    info!(
        files = stats.files,
        dirs = stats.dirs,
        bytes = stats.bytes,
        "tree generated"
    );
    Ok(())
}
