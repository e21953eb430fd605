//! RateBook / RuleBook / LimitBook storage (§3, §5): each table is replaced
//! wholesale on refresh rather than diffed row-by-row, matching how the
//! periodic refresh jobs (§5) are specified — delete-then-insert inside one
//! transaction so readers never observe a partially-replaced set.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Row};

use plm_schemas::{BusinessStatus, Direction, ExchangeRate, ExposureLimit, FilteringRule};

use crate::settlement::{business_status_str, direction_str, parse_business_status, parse_direction};

pub async fn fetch_exchange_rate<'e, E>(exec: E, currency: &str) -> Result<Option<ExchangeRate>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query("select currency, rate_to_usd, updated_at from exchange_rate where currency = $1")
        .bind(currency)
        .fetch_optional(exec)
        .await
        .context("fetch_exchange_rate failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(ExchangeRate {
        currency: row.try_get("currency")?,
        rate_to_usd: row.try_get("rate_to_usd")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Fetch the entire RateBook snapshot (§5 periodic refresh / daemon startup).
pub async fn list_exchange_rates<'e, E>(exec: E) -> Result<Vec<ExchangeRate>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query("select currency, rate_to_usd, updated_at from exchange_rate")
        .fetch_all(exec)
        .await
        .context("list_exchange_rates failed")?;

    rows.into_iter()
        .map(|row| -> Result<ExchangeRate> {
            Ok(ExchangeRate {
                currency: row.try_get("currency")?,
                rate_to_usd: row.try_get("rate_to_usd")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Replace the entire RateBook in one transaction (§5 periodic refresh).
pub async fn replace_exchange_rates(
    pool: &sqlx::PgPool,
    rates: &[(String, Decimal)],
) -> Result<()> {
    let mut tx = pool.begin().await.context("replace_exchange_rates: begin")?;
    sqlx::query("delete from exchange_rate")
        .execute(&mut *tx)
        .await
        .context("replace_exchange_rates: delete")?;
    for (currency, rate) in rates {
        sqlx::query(
            "insert into exchange_rate (currency, rate_to_usd, updated_at) values ($1, $2, now())",
        )
        .bind(currency)
        .bind(rate)
        .execute(&mut *tx)
        .await
        .context("replace_exchange_rates: insert")?;
    }
    tx.commit().await.context("replace_exchange_rates: commit")?;
    Ok(())
}

pub async fn fetch_filtering_rules<'e, E>(exec: E) -> Result<Vec<FilteringRule>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query("select direction, business_status from filtering_rule")
        .fetch_all(exec)
        .await
        .context("fetch_filtering_rules failed")?;

    rows.into_iter()
        .map(|row| -> Result<FilteringRule> {
            let direction: String = row.try_get("direction")?;
            let business_status: String = row.try_get("business_status")?;
            Ok(FilteringRule {
                direction: parse_direction(&direction)?,
                business_status: parse_business_status(&business_status)?,
            })
        })
        .collect()
}

pub async fn replace_filtering_rules(
    pool: &sqlx::PgPool,
    rules: &[(Direction, BusinessStatus)],
) -> Result<()> {
    let mut tx = pool.begin().await.context("replace_filtering_rules: begin")?;
    sqlx::query("delete from filtering_rule")
        .execute(&mut *tx)
        .await
        .context("replace_filtering_rules: delete")?;
    for (direction, status) in rules {
        sqlx::query(
            "insert into filtering_rule (direction, business_status, updated_at) values ($1, $2, now())",
        )
        .bind(direction_str(*direction))
        .bind(business_status_str(*status))
        .execute(&mut *tx)
        .await
        .context("replace_filtering_rules: insert")?;
    }
    tx.commit().await.context("replace_filtering_rules: commit")?;
    Ok(())
}

/// `counterparty_id = None` is the flat/global limit row.
pub async fn fetch_exposure_limit<'e, E>(
    exec: E,
    counterparty_id: Option<&str>,
) -> Result<Option<ExposureLimit>>
where
    E: PgExecutor<'e>,
{
    let row = match counterparty_id {
        Some(cp) => {
            sqlx::query(
                "select counterparty_id, limit_usd, updated_at from exposure_limit where counterparty_id = $1",
            )
            .bind(cp)
            .fetch_optional(exec)
            .await
        }
        None => {
            sqlx::query(
                "select counterparty_id, limit_usd, updated_at from exposure_limit where counterparty_id is null",
            )
            .fetch_optional(exec)
            .await
        }
    }
    .context("fetch_exposure_limit failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(ExposureLimit {
        counterparty_id: row.try_get("counterparty_id")?,
        limit_usd: row.try_get("limit_usd")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Fetch the entire LimitBook snapshot: the flat row (if any) plus every
/// per-counterparty override.
pub async fn list_exposure_limits<'e, E>(exec: E) -> Result<Vec<ExposureLimit>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query("select counterparty_id, limit_usd, updated_at from exposure_limit")
        .fetch_all(exec)
        .await
        .context("list_exposure_limits failed")?;

    rows.into_iter()
        .map(|row| -> Result<ExposureLimit> {
            Ok(ExposureLimit {
                counterparty_id: row.try_get("counterparty_id")?,
                limit_usd: row.try_get("limit_usd")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

pub async fn replace_exposure_limits(
    pool: &sqlx::PgPool,
    limits: &[(Option<String>, Decimal)],
) -> Result<()> {
    let mut tx = pool.begin().await.context("replace_exposure_limits: begin")?;
    sqlx::query("delete from exposure_limit")
        .execute(&mut *tx)
        .await
        .context("replace_exposure_limits: delete")?;
    for (counterparty_id, limit_usd) in limits {
        sqlx::query(
            "insert into exposure_limit (counterparty_id, limit_usd, updated_at) values ($1, $2, now())",
        )
        .bind(counterparty_id)
        .bind(limit_usd)
        .execute(&mut *tx)
        .await
        .context("replace_exposure_limits: insert")?;
    }
    tx.commit().await.context("replace_exposure_limits: commit")?;
    Ok(())
}
