// crates/plm-db/src/lib.rs
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "PLM_DATABASE_URL";

pub mod activity;
pub mod approval;
pub mod config_tables;
pub mod running_total;
pub mod settlement;

pub use activity::{append_activity, list_activity_for_business_id};
pub use approval::{approval_authorise, approval_request_release, approval_reset, fetch_approval};
pub use config_tables::{
    fetch_exchange_rate, fetch_exposure_limit, fetch_filtering_rules, list_exchange_rates,
    list_exposure_limits, replace_exchange_rates, replace_exposure_limits, replace_filtering_rules,
};
pub use running_total::{fetch_running_total, list_running_totals_in_scope, upsert_running_total};
pub use settlement::{
    current_max_ref_id, fetch_latest_settlement, fetch_settlement_by_version,
    find_previous_counterparty, find_previous_version, insert_settlement, mark_old_versions,
    scan_latest_eligible,
};

/// Connect to Postgres using PLM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Test helper: connect using PLM_DATABASE_URL and ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='settlement'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_settlement_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_settlement_table: bool,
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}
