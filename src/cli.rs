use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::VerifyVariant;

/// snapverify - verify remote loopback snapshots against a reference tree
#[derive(Parser, Debug)]
#[command(name = "snapverify")]
#[command(about = "Verify remote loopback snapshots against a reference tree over ssh")]
#[command(version)]
pub struct Cli {
    /// Print remote commands instead of running them.
    ///
    /// Every command is treated as successful and the mount listing as
    /// empty, so the whole success path is shown.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one verification cycle; the exit status is the comparison result
    Verify {
        /// Configuration file (overrides --variant)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Built-in preset to use when no configuration file is given
        #[arg(short, long, default_value_t = VerifyVariant::LoopImage)]
        variant: VerifyVariant,

        /// Weekday index (0 = Monday) instead of today's
        #[arg(short, long)]
        weekday: Option<usize>,
    },
    /// Print the weekday label a preset would use
    Weekday {
        /// Weekday index (0 = Monday) instead of today's
        #[arg(short, long)]
        index: Option<usize>,

        /// Preset whose label table to use
        #[arg(short, long, default_value_t = VerifyVariant::LoopImageWeekday)]
        variant: VerifyVariant,
    },
    /// Write a preset configuration to a JSON file
    GenConfig {
        /// Preset to write
        #[arg(short, long, default_value_t = VerifyVariant::LoopImage)]
        variant: VerifyVariant,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
