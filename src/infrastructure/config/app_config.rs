//! Loader configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::entities::BoundingBox;
use crate::infrastructure::image::disk_cache::{
    DEFAULT_MAX_CACHE_SIZE, DEFAULT_SUBDIRECTORY, resolve_cache_dir,
};
use crate::infrastructure::image::encoder::{CompressFormat, DEFAULT_QUALITY};
use crate::infrastructure::image::memory_cache::{
    DEFAULT_FRACTION_DIVISOR, DEFAULT_MEMORY_CLASS_MB, MemoryBudget,
};

pub(crate) const APP_NAME: &str = "asyncloader";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

/// Default decode bounding box edge in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 50;

/// Default number of decode workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Top-level loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Read and write the cache tiers. When false every load decodes from source.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Memory tier configuration.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Disk tier configuration.
    #[serde(default)]
    pub disk: DiskConfig,

    /// Decoder configuration.
    #[serde(default)]
    pub decode: DecodeConfig,
}

/// Memory tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Explicit capacity in bytes. Overrides the fraction when set.
    #[serde(default)]
    pub capacity_bytes: Option<u64>,

    /// Memory class in MiB the fraction is taken of.
    #[serde(default = "default_memory_class_mb")]
    pub memory_class_mb: u64,

    /// The cache gets `1 / fraction_divisor` of the memory class.
    #[serde(default = "default_fraction_divisor")]
    pub fraction_divisor: u32,
}

impl MemoryConfig {
    /// Returns the budget this configuration describes.
    #[must_use]
    pub fn budget(&self) -> MemoryBudget {
        self.capacity_bytes.map_or(
            MemoryBudget::FractionOfClass {
                class_mb: self.memory_class_mb,
                divisor: self.fraction_divisor,
            },
            MemoryBudget::Bytes,
        )
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: None,
            memory_class_mb: DEFAULT_MEMORY_CLASS_MB,
            fraction_divisor: DEFAULT_FRACTION_DIVISOR,
        }
    }
}

/// Disk tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Attach a disk tier.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum bytes kept on disk.
    #[serde(default = "default_disk_capacity")]
    pub capacity_bytes: u64,

    /// Subdirectory under the cache root.
    #[serde(default = "default_subdirectory")]
    pub subdirectory: String,

    /// Preferred cache root, used when it exists and is writable.
    #[serde(default)]
    pub external_dir: Option<PathBuf>,

    /// Exact directory to use, bypassing root selection.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Encoded format of cached images.
    #[serde(default)]
    pub format: CompressFormat,

    /// JPEG quality (1-100).
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Fail loader construction instead of running without a disk tier when
    /// the store cannot be opened.
    #[serde(default)]
    pub fail_fast: bool,
}

impl DiskConfig {
    /// Returns the directory the disk tier lives in.
    #[must_use]
    pub fn resolve_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            resolve_cache_dir(self.external_dir.as_deref(), &self.subdirectory)
        })
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_bytes: DEFAULT_MAX_CACHE_SIZE,
            subdirectory: default_subdirectory(),
            external_dir: None,
            directory: None,
            format: CompressFormat::default(),
            quality: DEFAULT_QUALITY,
            fail_fast: false,
        }
    }
}

/// Decoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum decoded width, within one power-of-two step.
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    /// Maximum decoded height, within one power-of-two step.
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// Allocation limit for a single decode; exceeding it is an out-of-memory.
    #[serde(default)]
    pub max_alloc_bytes: Option<u64>,

    /// Number of concurrent decode workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl DecodeConfig {
    /// Returns the decode bounding box.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.max_width, self.max_height)
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            max_alloc_bytes: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_class_mb() -> u64 {
    DEFAULT_MEMORY_CLASS_MB
}

fn default_fraction_divisor() -> u32 {
    DEFAULT_FRACTION_DIVISOR
}

fn default_disk_capacity() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

fn default_subdirectory() -> String {
    DEFAULT_SUBDIRECTORY.to_string()
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

use super::args::CliArgs;

impl LoaderConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if args.no_cache {
            self.use_cache = false;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.disk.directory = Some(cache_dir.clone());
        }
        if let Some(format) = args.format {
            self.disk.format = format;
        }
        if let Some(quality) = args.quality {
            self.disk.quality = quality;
        }
        if let Some(max_width) = args.max_width {
            self.decode.max_width = max_width;
        }
        if let Some(max_height) = args.max_height {
            self.decode.max_height = max_height;
        }
        if let Some(workers) = args.workers {
            self.decode.workers = workers;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            use_cache: true,
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
            decode: DecodeConfig::default(),
        }
    }
}
