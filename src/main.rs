use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use asyncloader::domain::entities::{ImageRef, ImageSource};
use asyncloader::infrastructure::{
    CliArgs, ImageLoader, LoaderConfig, StorageManager, TaskOutcome,
};
use asyncloader::presentation::widgets::ImageSurface;

fn init_logging(config: &LoaderConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<(StorageManager, LoaderConfig)> {
    let storage = StorageManager::new().unwrap_or_else(|_| {
        StorageManager::with_dir(std::env::current_dir().unwrap_or_default())
    });
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok((storage, config))
}

#[derive(Debug, Serialize)]
struct LoadReport {
    source: String,
    loaded: bool,
    width: Option<u32>,
    height: Option<u32>,
    from: Option<ImageSource>,
}

impl LoadReport {
    fn new(source: &ImageRef, outcome: Option<&TaskOutcome>) -> Self {
        let image = outcome.and_then(TaskOutcome::image);
        Self {
            source: source.to_string(),
            loaded: image.is_some(),
            width: image.map(|l| l.image.width()),
            height: image.map(|l| l.image.height()),
            from: image.map(|l| l.source),
        }
    }
}

impl std::fmt::Display for LoadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.width, self.height, self.from) {
            (Some(width), Some(height), Some(from)) => {
                write!(f, "{}: {width}x{height} ({from})", self.source)
            }
            _ => write!(f, "{}: no image", self.source),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let (storage, config) = load_config(&args)?;

    init_logging(&config)?;

    if args.save_config {
        let path = storage.save_config(&config)?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    info!(version = asyncloader::VERSION, "Starting {}", asyncloader::NAME);

    let loader = ImageLoader::from_config(&config)?;

    if args.clear_cache {
        loader.clear_caches().await;
    }

    let sources: Vec<ImageRef> = args.sources.iter().cloned().map(ImageRef::File).collect();
    let surfaces: Vec<Arc<ImageSurface>> = sources
        .iter()
        .map(|_| Arc::new(ImageSurface::new()))
        .collect();

    let mut requests = Vec::with_capacity(sources.len());
    for (source, surface) in sources.iter().zip(&surfaces) {
        match loader.load_into(source, surface) {
            Ok(request) => requests.push(Some(request)),
            Err(e) => {
                warn!(source = %source, error = %e, "Skipping source");
                requests.push(None);
            }
        }
    }

    let outcomes = join_all(requests.into_iter().map(|request| async move {
        match request {
            Some(request) => request.wait().await,
            None => None,
        }
    }))
    .await;

    let reports: Vec<LoadReport> = sources
        .iter()
        .zip(&outcomes)
        .map(|(source, outcome)| LoadReport::new(source, outcome.as_ref()))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{report}");
        }
    }

    info!(stats = %loader.stats(), "Finished");

    Ok(())
}
