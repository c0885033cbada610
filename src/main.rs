//! study-roulette server binary.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use study_roulette::config::Settings;
use study_roulette::redirect::AppState;
use study_roulette::server;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_filter()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    tracing::info!(
        lookup_dir = %settings.lookup_dir.display(),
        studies_file = %settings.studies_file.display(),
        "study-roulette starting"
    );

    let state = Arc::new(AppState::new(
        settings.lookup_dir.clone(),
        settings.studies_file.clone(),
    ));

    server::start_server(settings.listen, state).await?;

    Ok(())
}
