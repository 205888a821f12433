use std::sync::Arc;

use anyhow::{bail, Context};

use critique_ai::OpenAiGenerator;
use critique_api::app::{self, services::AppServices};
use critique_infra::config::AppConfig;
use critique_infra::stores::load_personas;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    critique_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.openai.api_key.trim().is_empty() {
        bail!("OPENAI_API_KEY must be set");
    }

    let personas = load_personas(&config.personas_file)
        .with_context(|| format!("failed to load personas from {}", config.personas_file.display()))?;
    tracing::info!(count = personas.len(), model = %config.openai.model, "personas loaded");

    let generator = Arc::new(OpenAiGenerator::new(config.openai.clone()));
    let services = Arc::new(AppServices::new(personas, generator, &config.analysis)?);
    let sweeper = services.analysis.spawn_sweeper();

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    sweeper.abort();
    Ok(())
}
