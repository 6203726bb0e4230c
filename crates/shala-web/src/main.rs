mod error;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use shala_core::config::ShalaConfig;
use shala_core::retry::RetryPolicy;
use shala_core::storage::{self, Storage};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub storage: Storage,
    pub config: ShalaConfig,
}

impl AppState {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.registration.retry_policy()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shala_web=info".into()),
        )
        .init();

    let cwd = std::env::current_dir().ok();
    let config = ShalaConfig::load(cwd.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        ShalaConfig::default_config()
    });

    let storage = storage::create_backend(&config)?;

    let state = Arc::new(AppState {
        storage,
        config: config.clone(),
    });

    let app = routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.web.host, config.web.port);
    tracing::info!("shala-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
