use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rollcall_core::{EuclideanMatcher, Gallery, GalleryRow, SidecarEngine};
use rollcall_hw::{CaptureBackend, FrameSource, V4l2Backend};
use rollcall_store::Store;

mod config;
mod orchestrator;
mod reconciler;

use config::Config;
use orchestrator::{Orchestrator, Timing};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env()?;
    let store = Store::open(&config.db_path)
        .await
        .context("failed to open attendance store")?;

    let rows = store
        .students_with_encoding()
        .await
        .context("failed to read student encodings")?;
    let total = rows.len();
    let load = Gallery::load(rows.into_iter().map(|row| GalleryRow {
        student_id: row.student_id,
        name: row.name,
        encoding: row.encoding,
    }))
    .context("gallery is unusable")?;
    tracing::info!(valid = load.valid, invalid = load.invalid, total, "gallery loaded");

    let engine = SidecarEngine::new(&config.engine_command)?;
    let matcher = EuclideanMatcher {
        match_tolerance: config.match_tolerance,
        distance_threshold: config.distance_threshold,
    };
    let backends: Vec<Box<dyn CaptureBackend>> = config
        .camera_devices
        .iter()
        .map(|device| Box::new(V4l2Backend::new(device.clone())) as Box<dyn CaptureBackend>)
        .collect();
    tracing::info!(devices = ?config.camera_devices, "capture backends configured");
    let source = FrameSource::new(backends);

    let timing = Timing {
        tick_interval: config.tick_interval,
        idle_poll: config.idle_poll,
        retry_delay: config.retry_delay,
        store_timeout: config.store_timeout,
    };
    let orchestrator = Orchestrator::new(
        store,
        load.gallery,
        engine,
        matcher,
        source,
        config.cooldown,
        timing,
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_cancel.cancel();
        }
    });

    orchestrator.run(cancel).await;
    tracing::info!("rollcalld stopped");

    Ok(())
}
