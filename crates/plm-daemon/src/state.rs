//! Shared runtime state for plm-daemon.
//!
//! `AppState` holds the database pool, the static config, and the three
//! read-mostly snapshots (`RateBook`, `RuleBook`, `LimitBook`) behind
//! `Arc<RwLock<_>>` — the copy-on-write snapshot pointer the concurrency
//! model calls for (§5): a refresher task builds a brand-new snapshot value
//! and swaps the pointer under a short write lock, so readers never observe
//! a torn mix of old/new rows within one snapshot.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{error, info};

use plm_config::PlmConfig;
use plm_limits::{LimitBook, RateBook, RuleBook};

/// Static build metadata included in health responses.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: PlmConfig,
    pub build: BuildInfo,
    pub rate_book: Arc<RwLock<RateBook>>,
    pub rule_book: Arc<RwLock<RuleBook>>,
    pub limit_book: Arc<RwLock<LimitBook>>,
}

impl AppState {
    /// Loads the three snapshots once from the config tables and wraps them
    /// for the refresher tasks to later swap.
    pub async fn new(pool: PgPool, config: PlmConfig) -> anyhow::Result<Self> {
        let rate_book = load_rate_book(&pool).await?;
        let rule_book = load_rule_book(&pool).await?;
        let limit_book = load_limit_book(&pool, &config).await?;

        Ok(Self {
            pool,
            config,
            build: BuildInfo {
                service: "plm-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            rate_book: Arc::new(RwLock::new(rate_book)),
            rule_book: Arc::new(RwLock::new(rule_book)),
            limit_book: Arc::new(RwLock::new(limit_book)),
        })
    }
}

async fn load_rate_book(pool: &PgPool) -> anyhow::Result<RateBook> {
    let rows = plm_db::list_exchange_rates(pool).await?;
    Ok(RateBook::from_rows(&rows))
}

async fn load_rule_book(pool: &PgPool) -> anyhow::Result<RuleBook> {
    let rules = plm_db::fetch_filtering_rules(pool).await?;
    if rules.is_empty() {
        // No operator-configured rules yet: fall back to the canonical
        // PAY/VERIFIED-only eligibility set rather than an empty RuleBook
        // that would exclude everything.
        return Ok(RuleBook::canonical_default());
    }
    Ok(RuleBook::new(rules))
}

async fn load_limit_book(pool: &PgPool, config: &PlmConfig) -> anyhow::Result<LimitBook> {
    match config.limit_mode {
        plm_config::LimitMode::Flat => {
            let limit_usd = config
                .flat_limit_usd
                .ok_or_else(|| anyhow::anyhow!("limit_mode=flat requires flat_limit_usd"))?;
            Ok(LimitBook::flat(limit_usd))
        }
        plm_config::LimitMode::PerCounterparty => {
            let rows = plm_db::list_exposure_limits(pool).await?;
            Ok(LimitBook::from_rows(config.limit_mode, &rows))
        }
    }
}

/// Spawns the independent periodic refresher tasks for RateBook and RuleBook
/// (§5: "typically every 5 minutes for rules, daily for rates and limits").
/// LimitBook in `flat` mode never changes without a config reload, so it has
/// no refresher; in `per-counterparty` mode it refreshes on the rate cadence.
pub fn spawn_refreshers(state: Arc<AppState>) {
    let rate_state = Arc::clone(&state);
    tokio::spawn(async move {
        refresh_loop(rate_state.config.rate_refresh_interval(), move || {
            let state = Arc::clone(&rate_state);
            async move {
                let rate_book = load_rate_book(&state.pool).await?;
                *state.rate_book.write().await = rate_book;
                if matches!(state.config.limit_mode, plm_config::LimitMode::PerCounterparty) {
                    let limit_book = load_limit_book(&state.pool, &state.config).await?;
                    *state.limit_book.write().await = limit_book;
                }
                Ok(())
            }
        })
        .await;
    });

    let rule_state = Arc::clone(&state);
    tokio::spawn(async move {
        refresh_loop(rule_state.config.rule_refresh_interval(), move || {
            let state = Arc::clone(&rule_state);
            async move {
                let rule_book = load_rule_book(&state.pool).await?;
                *state.rule_book.write().await = rule_book;
                Ok(())
            }
        })
        .await;
    });
}

async fn refresh_loop<F, Fut>(interval: Duration, mut refresh_once: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; snapshot is already loaded at startup
    loop {
        ticker.tick().await;
        match refresh_once().await {
            Ok(()) => info!("config snapshot refreshed"),
            Err(e) => error!(error = %e, "config snapshot refresh failed; keeping previous snapshot"),
        }
    }
}
