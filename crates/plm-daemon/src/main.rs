//! plm-daemon entry point.
//!
//! This file is intentionally thin: it loads configuration, sets up tracing,
//! connects to Postgres, builds the shared state, wires middleware, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use plm_daemon::{routes, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly. Silent if absent.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = config_paths_from_env();
    let loaded = plm_config::load_layered_yaml(
        &config_paths.iter().map(String::as_str).collect::<Vec<_>>(),
    )
    .context("failed to load configuration")?;
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let pool = plm_db::connect(&loaded.config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    plm_db::migrate(&pool).await.context("failed to run migrations")?;

    let bind_addr = loaded.config.bind_addr.clone();
    let shared = Arc::new(state::AppState::new(pool, loaded.config).await?);
    state::spawn_refreshers(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    info!("plm-daemon listening on http://{}", bind_addr);

    axum::serve(tokio::net::TcpListener::bind(&bind_addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Config layer paths: a base file plus an optional environment overlay, per
/// the deep-merge policy `plm-config` implements. `PLM_CONFIG_PATHS`
/// overrides the default when set, as a comma-separated list.
fn config_paths_from_env() -> Vec<String> {
    if let Ok(paths) = std::env::var("PLM_CONFIG_PATHS") {
        return paths.split(',').map(str::trim).map(String::from).collect();
    }

    let mut paths = vec!["config/base.yaml".to_string()];
    if let Ok(env_name) = std::env::var("PLM_ENV") {
        paths.push(format!("config/{env_name}.yaml"));
    }
    paths
}
