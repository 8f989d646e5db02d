use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod config;
mod engine;
mod media;
mod server;
mod utils;

use config::Config;
use engine::{Engine, EngineOptions};
use media::{Ffmpeg, YtDlpExtractor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory finished downloads are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn get_config_path(args: &Args) -> Option<String> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }

    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Some(path);
    }

    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        let config_dir = format!("{}/downify", xdg_config_home);
        let config_path = format!("{}/config.toml", config_dir);
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let config_dir = format!("{}/.config/downify", home.display());
        let config_path = format!("{}/config.toml", config_dir);
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    None
}

fn load_config(args: &Args) -> Result<(Config, Option<String>)> {
    let config_path = get_config_path(args);
    let mut config = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(output_dir) = &args.output_dir {
        config.storage.output_dir = output_dir.clone();
    }

    Ok((config, config_path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_path) = load_config(&args)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if config.get_logging_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Starting Downify...");
    match &config_path {
        Some(path) => info!("Loaded config from: {}", path),
        None => info!("No config file found, using defaults"),
    }

    let extractor = Arc::new(YtDlpExtractor::new(&config.tools));
    let transcoder = Arc::new(Ffmpeg::detect(&config.tools.ffmpeg).await);

    if let Err(e) = media::test_setup(extractor.as_ref(), transcoder.as_ref()).await {
        warn!("⚠️  {}", e);
    }

    let engine = Engine::new(
        extractor,
        transcoder,
        EngineOptions {
            output_dir: config.storage.output_dir.clone(),
            max_concurrent: config.tasks.max_concurrent,
        },
    );
    engine.prepare_storage().await?;
    info!("Writing downloads to {}", engine.output_root().display());

    server::serve(
        server::AppState { engine },
        &config.server.host,
        config.server.port,
    )
    .await
}
