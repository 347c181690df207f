use std::{fs, sync::Arc};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cropscan::annotate::Annotator;
use cropscan::config::Config;
use cropscan::local::{load_labels, LocalClassifier};
use cropscan::remote::RemoteClassifier;
use cropscan::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    ensure!(config.model_path.exists(), "Model path does not exist");

    let labels = match &config.labels_path {
        Some(path) => Some(load_labels(path)?),
        None => None,
    };
    let local = LocalClassifier::new(
        &config.model_path,
        config.device_id,
        config.image_size,
        labels,
    )?;
    let hosted = RemoteClassifier::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.api_model_id.clone(),
    );

    let annotator = match &config.font_path {
        Some(path) => Some(Annotator::from_path(path)?),
        None => match Annotator::discover() {
            Ok(annotator) => Some(annotator),
            Err(err) => {
                tracing::warn!(%err, "annotation disabled, predictions will not be drawn");
                None
            }
        },
    };

    let background = match &config.background_path {
        Some(path) => Some(fs::read(path).with_context(|| {
            format!("Failed to read background image: {}", path.display())
        })?),
        None => None,
    };

    let state = AppState::new(
        Arc::new(hosted),
        Arc::new(local),
        annotator,
        background.as_deref(),
        config.upload_dir.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, model = %config.api_model_id, "cropscan listening");

    axum::serve(listener, server::router(state)).await?;

    Ok(())
}
