mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use meshcast_coordinator::{Coordinator, CoordinatorEvent, EngineConfig, NullSceneSink, Provenance, Transform};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Tracker { bind } => run_tracker(bind).await,
        Commands::Share { file, tracker, listen, producer, prompt, config } => {
            run_share(config, tracker, listen, file, producer, prompt).await
        }
        Commands::Join { content, tracker, listen, out, config } => run_join(config, tracker, listen, content, out).await,
    }
}

async fn run_tracker(bind: SocketAddr) -> anyhow::Result<()> {
    let config = meshcast_tracker::TrackerConfig::default();
    meshcast_tracker::serve(bind, config).await.context("tracker failed")
}

/// Builds an [`EngineConfig`] from an optional `--config` TOML file, with
/// `--tracker`/`--listen` (when given) overriding whatever the file sets.
fn resolve_config(
    config_path: Option<std::path::PathBuf>,
    tracker: Option<String>,
    listen: Option<String>,
) -> anyhow::Result<EngineConfig> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load_file(&path).context("loading --config file")?,
        None => EngineConfig::new("ws://127.0.0.1:9000/ws"),
    };
    if let Some(tracker) = tracker {
        config.tracker_url = tracker;
    }
    if let Some(listen) = listen {
        config.listen_addr = listen.parse().context("parsing --listen as a multiaddr")?;
    }
    Ok(config)
}

async fn run_share(
    config_path: Option<std::path::PathBuf>,
    tracker: Option<String>,
    listen: Option<String>,
    file: std::path::PathBuf,
    producer: String,
    prompt: Option<String>,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;

    let config = resolve_config(config_path, tracker, listen)?;

    let (coordinator, handle, mut events) = Coordinator::new(config, Arc::new(NullSceneSink));
    let run_handle = tokio::spawn(coordinator.run());

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    let provenance = Provenance {
        producer_id: producer,
        prompt,
        created_at_ms: 0,
        total_bytes: 0,
        total_pieces: 0,
    };
    let content = handle
        .share_model(bytes, Transform::identity(), provenance)
        .await
        .context("sharing model")?;
    tracing::info!(%content, "model shared, content id assigned");

    run_handle.await.context("coordinator task panicked")?.context("coordinator loop failed")
}

async fn run_join(
    config_path: Option<std::path::PathBuf>,
    tracker: Option<String>,
    listen: Option<String>,
    content: String,
    out: std::path::PathBuf,
) -> anyhow::Result<()> {
    let config = resolve_config(config_path, tracker, listen)?;

    let (coordinator, handle, mut events) = Coordinator::new(config, Arc::new(NullSceneSink));
    let run_handle = tokio::spawn(coordinator.run());

    let content_id = meshcast_coordinator::ContentId::from(content);
    handle.join(content_id.clone()).await.context("announcing interest to tracker")?;

    loop {
        match events.recv().await {
            Ok(CoordinatorEvent::ModelReceived { package, blob }) if package.content_id == content_id => {
                std::fs::write(&out, &blob).with_context(|| format!("writing {}", out.display()))?;
                tracing::info!(path = %out.display(), bytes = blob.len(), "model reassembled and written");
                break;
            }
            Ok(event) => log_event(&event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                anyhow::bail!("coordinator event stream closed before the model arrived")
            }
        }
    }

    handle.shutdown().await;
    let _ = run_handle.await;
    Ok(())
}

fn log_event(event: &CoordinatorEvent) {
    match event {
        CoordinatorEvent::PeerConnected { peer } => tracing::info!(%peer, "peer connected"),
        CoordinatorEvent::PeerDisconnected { peer } => tracing::info!(%peer, "peer disconnected"),
        CoordinatorEvent::DownloadProgress { content, percent } => {
            tracing::info!(%content, percent, "download progress")
        }
        CoordinatorEvent::ModelReceived { package, blob } => {
            tracing::info!(content = %package.content_id, bytes = blob.len(), "model received")
        }
        CoordinatorEvent::TrackerUnavailable => tracing::warn!("tracker unavailable, reconnecting"),
        CoordinatorEvent::TrackerReconnected => tracing::info!("tracker reconnected"),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
