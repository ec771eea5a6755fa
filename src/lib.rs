//! asyncloader - Asynchronous image loading with a two-tier cache.
//!
//! This crate decodes images into bounded thumbnails on background workers,
//! caches them in memory and on disk, and guarantees that a display surface
//! reassigned to new content never shows a stale image.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, codecs, storage and configuration.
pub mod infrastructure;
/// Presentation layer containing display surfaces.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "asyncloader";
