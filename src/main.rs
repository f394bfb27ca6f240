use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod control;
mod detect;
mod pipeline;
mod slot;
mod transport;

use api::AppState;
use config::Config;
use control::CommandBus;
use detect::YoloDetector;
use pipeline::IngestLoop;
use slot::FrameSlot;
use transport::FrameHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("camhub=debug".parse()?))
        .init();

    let config = Config::load()?;

    tracing::info!(model = %config.detector.model_path, "loading detection model");
    let detector = YoloDetector::new(
        &config.detector.model_path,
        config.detector.confidence_threshold,
    )?;
    tracing::info!(
        classes = %config.detector.considered_classes.join(", "),
        "considering classes"
    );

    let hub = FrameHub::bind(config.transport.bind_addr).await?;

    let slot = Arc::new(FrameSlot::new());
    let devices = Arc::new(RwLock::new(Vec::new()));
    let bus = CommandBus::connect(&config.mqtt);

    let shutdown = Arc::new(AtomicBool::new(false));
    let ingest = IngestLoop::new(
        hub,
        Box::new(detector),
        Arc::clone(&slot),
        Arc::clone(&devices),
        &config.detector,
        &config.montage,
        &config.liveness,
    );
    let ingest_handle = ingest.spawn(Arc::clone(&shutdown));

    let state = AppState { slot, devices, bus };

    let server_error = tokio::select! {
        result = api::start_server(state, config.http.port) => result.err(),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            None
        }
    };

    // Stop the ingestion thread before the runtime winds down; it checks the
    // flag between receive timeouts.
    shutdown.store(true, Ordering::Relaxed);
    let _ = ingest_handle.await;

    if let Some(e) = server_error {
        return Err(e.into());
    }

    tracing::info!("shutdown complete");
    Ok(())
}
