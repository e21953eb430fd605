//! RunningTotal store (§4.3): one row per live group, guarded by a
//! `ref_id_watermark` so an out-of-order recompute can never clobber a result
//! computed from a higher `ref_id`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Row};

use plm_schemas::{GroupKey, RunningTotal};

/// Insert a group's total if absent, or overwrite it only if the stored
/// `ref_id_watermark <= ref_id`. A write from a stale `ref_id` is silently
/// dropped — the caller's in-flight recompute has already been superseded.
pub async fn upsert_running_total<'e, E>(
    exec: E,
    group: &GroupKey,
    total_usd: Decimal,
    settlement_count: i32,
    ref_id: i64,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        insert into running_total (
            pts, processing_entity, counterparty_id, value_date,
            total_usd, ref_id_watermark, settlement_count, updated_at
        ) values ($1, $2, $3, $4, $5, $6, $7, now())
        on conflict (pts, processing_entity, counterparty_id, value_date)
        do update set
            total_usd = excluded.total_usd,
            ref_id_watermark = excluded.ref_id_watermark,
            settlement_count = excluded.settlement_count,
            updated_at = now()
        where running_total.ref_id_watermark <= excluded.ref_id_watermark
        "#,
    )
    .bind(&group.pts)
    .bind(&group.processing_entity)
    .bind(&group.counterparty_id)
    .bind(group.value_date)
    .bind(total_usd)
    .bind(ref_id)
    .bind(settlement_count)
    .execute(exec)
    .await
    .context("upsert_running_total failed")?;
    Ok(())
}

pub async fn fetch_running_total<'e, E>(
    exec: E,
    group: &GroupKey,
) -> Result<Option<RunningTotal>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        select pts, processing_entity, counterparty_id, value_date,
               total_usd, ref_id_watermark, settlement_count, updated_at
        from running_total
        where pts = $1 and processing_entity = $2 and counterparty_id = $3 and value_date = $4
        "#,
    )
    .bind(&group.pts)
    .bind(&group.processing_entity)
    .bind(&group.counterparty_id)
    .bind(group.value_date)
    .fetch_optional(exec)
    .await
    .context("fetch_running_total failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_running_total(row)?))
}

/// Enumerate every group in scope for a `RecalculateScope` request (§4.3/§6).
/// `pts`, `processing_entity` and `counterparty_id` each narrow the scan when
/// given and match every value when omitted, so an operator can recompute a
/// single group, every group for one pts/entity, or the entire book.
pub async fn list_running_totals_in_scope<'e, E>(
    exec: E,
    pts: Option<&str>,
    processing_entity: Option<&str>,
    counterparty_id: Option<&str>,
) -> Result<Vec<RunningTotal>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        select pts, processing_entity, counterparty_id, value_date,
               total_usd, ref_id_watermark, settlement_count, updated_at
        from running_total
        where ($1::text is null or pts = $1)
          and ($2::text is null or processing_entity = $2)
          and ($3::text is null or counterparty_id = $3)
        "#,
    )
    .bind(pts)
    .bind(processing_entity)
    .bind(counterparty_id)
    .fetch_all(exec)
    .await
    .context("list_running_totals_in_scope failed")?;

    rows.into_iter().map(row_to_running_total).collect()
}

fn row_to_running_total(row: sqlx::postgres::PgRow) -> Result<RunningTotal> {
    Ok(RunningTotal {
        pts: row.try_get("pts")?,
        processing_entity: row.try_get("processing_entity")?,
        counterparty_id: row.try_get("counterparty_id")?,
        value_date: row.try_get("value_date")?,
        total_usd: row.try_get("total_usd")?,
        ref_id_watermark: row.try_get("ref_id_watermark")?,
        settlement_count: row.try_get("settlement_count")?,
        updated_at: row.try_get("updated_at")?,
    })
}
