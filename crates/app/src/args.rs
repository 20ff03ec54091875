pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cipherchat")]
#[command(about = "End-to-end encrypted group chat")]
pub struct Args {
    /// Path to the profile directory (defaults to ~/.cipherchat)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
