//! Command-line arguments.

use super::app_config::LogLevel;
use crate::infrastructure::image::encoder::CompressFormat;
use clap::Parser;
use std::path::PathBuf;

/// Command-line options; each one overrides the matching config value.
#[derive(Debug, Parser)]
#[command(
    name = "asyncloader",
    version,
    about = "Decode images into bounded thumbnails through a memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image files to load.
    #[arg(required_unless_present = "save_config", value_name = "SOURCES")]
    pub sources: Vec<PathBuf>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Clear both cache tiers before loading.
    #[arg(long)]
    pub clear_cache: bool,

    /// Write the effective configuration to the config directory and exit.
    #[arg(long)]
    pub save_config: bool,

    /// Bypass the caches entirely.
    #[arg(long)]
    pub no_cache: bool,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Encoded format of cached images.
    #[arg(long, value_enum)]
    pub format: Option<CompressFormat>,

    /// JPEG quality (1-100).
    #[arg(long)]
    pub quality: Option<u8>,

    /// Maximum decoded width.
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Maximum decoded height.
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Number of decode workers.
    #[arg(long)]
    pub workers: Option<usize>,
}
