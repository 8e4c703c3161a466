//! tooldrop - release-driven tool installer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Installs command-line verification tools (z3, verus, rust-analyzer, scip)
//! from the release assets their projects publish, falling back to a source
//! build where a tool supports one.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.tooldrop/
//! ├── tools/<tool>/   # Installed binaries and their companions
//! └── overrides.toml  # Optional source priority overrides
//! ~/.local/bin/       # Links to installed binaries
//! ```

pub mod cmd;
pub mod ui;

pub use tooldrop_core::paths::*;
pub use tooldrop_core::USER_AGENT;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Releases fetched per source unless `-n` says otherwise.
pub const DEFAULT_NUM_RELEASES: usize = 30;

#[derive(Debug, Parser)]
#[command(name = "tooldrop")]
#[command(author, version, about = "tooldrop - install verification tools from their releases")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install a tool from its published releases
    Install(InstallArgs),
    /// List the tools tooldrop can install
    Tools,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    /// Tool to install (see `tooldrop tools`)
    pub tool: String,
    /// Release to install: an exact tag or a unique part of one
    #[arg(short = 'v', long)]
    pub version: Option<String>,
    /// Install the newest pre-release instead of the newest stable release
    #[arg(short = 'p', long = "pre-release", visible_alias = "prerelease")]
    pub pre_release: bool,
    /// Where --no-extract saves the archive (default: current directory)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
    /// Installation directory (default: ~/.tooldrop/tools/<tool>)
    #[arg(short = 'i', long)]
    pub install_dir: Option<PathBuf>,
    /// Directory that receives links to the installed binaries
    #[arg(long, env = "TOOLDROP_BIN_DIR")]
    pub bin_dir: Option<PathBuf>,
    /// Platform pattern to search for instead of the host's (e.g. x64-glibc)
    #[arg(long)]
    pub platform: Option<String>,
    /// List releases (and, with --version, their assets) without installing
    #[arg(short = 'l', long, visible_alias = "list-releases")]
    pub list: bool,
    /// Download the asset but do not extract or install it
    #[arg(long, conflicts_with = "from_source")]
    pub no_extract: bool,
    /// Do not modify PATH configuration
    #[arg(long)]
    pub no_path: bool,
    /// Build from source even when a prebuilt asset exists
    #[arg(long)]
    pub from_source: bool,
    /// Build directory (default: temporary directory)
    #[arg(short = 'b', long)]
    pub build_dir: Option<PathBuf>,
    /// Keep the build directory after installation
    #[arg(short = 'k', long)]
    pub keep_build: bool,
    /// Number of parallel build jobs (0: one per CPU)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,
    /// Number of releases to fetch from each source
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUM_RELEASES)]
    pub num_releases: usize,
    /// Source priority override table (default: ~/.tooldrop/overrides.toml)
    #[arg(long, env = "TOOLDROP_OVERRIDES")]
    pub overrides: Option<PathBuf>,
    /// Stream build commands to the terminal instead of build.log
    #[arg(long)]
    pub verbose: bool,
}
