//! SettlementStore (§4.2): append of settlement rows, mark-old, previous-counterparty
//! probe, and the group scan with latest-version-only filtering.
//!
//! Every function takes a generic `PgExecutor` so the ingestion pipeline can run the
//! whole 5-step flow (§4.4) against a single `Transaction`, while read-only callers
//! (status queries, `RecalculateScope`) can pass the bare pool.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Row};

use plm_schemas::{BusinessStatus, Direction, GroupKey, NewSettlement, Settlement, SettlementType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub ref_id: i64,
    pub duplicate: bool,
}

/// `insert(s) -> ref_id` (§4.2). On unique-violation of
/// `(business_id, pts, entity, version)`, returns the existing row's `ref_id`
/// without modifying any row.
///
/// A single round-trip: the `ins` CTE attempts the insert, and the fallback
/// arm only contributes a row when the CTE produced none, i.e. exactly on
/// conflict. This also means the executor is used exactly once, so this
/// function places no `Copy` bound on `E` and works equally against a bare
/// pool or a live transaction.
pub async fn insert_settlement<'e, E>(exec: E, s: &NewSettlement) -> Result<InsertOutcome>
where
    E: PgExecutor<'e>,
{
    let (ref_id, inserted): (i64, bool) = sqlx::query_as(
        r#"
        with ins as (
            insert into settlement (
                business_id, version, pts, processing_entity, counterparty_id, value_date,
                currency, amount, direction, settlement_type, business_status, is_old
            ) values (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, false
            )
            on conflict on constraint uq_settlement_business_version do nothing
            returning ref_id
        )
        select ref_id, true as inserted from ins
        union all
        select ref_id, false as inserted
        from settlement
        where business_id = $1 and pts = $3 and processing_entity = $4 and version = $2
          and not exists (select 1 from ins)
        "#,
    )
    .bind(&s.business_id)
    .bind(s.version)
    .bind(&s.pts)
    .bind(&s.processing_entity)
    .bind(&s.counterparty_id)
    .bind(s.value_date)
    .bind(&s.currency)
    .bind(s.amount)
    .bind(direction_str(s.direction))
    .bind(settlement_type_str(s.settlement_type))
    .bind(business_status_str(s.business_status))
    .fetch_one(exec)
    .await
    .context("insert_settlement failed")?;

    Ok(InsertOutcome {
        ref_id,
        duplicate: !inserted,
    })
}

/// `markOldVersions` (§4.2): idempotent — sets `is_old = true` on every row
/// whose `version` is less than the current maximum for the key.
pub async fn mark_old_versions<'e, E>(
    exec: E,
    business_id: &str,
    pts: &str,
    processing_entity: &str,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        update settlement
           set is_old = true, updated_at = now()
         where business_id = $1
           and pts = $2
           and processing_entity = $3
           and is_old = false
           and version < (
               select max(version)
               from settlement
               where business_id = $1 and pts = $2 and processing_entity = $3
           )
        "#,
    )
    .bind(business_id)
    .bind(pts)
    .bind(processing_entity)
    .execute(exec)
    .await
    .context("mark_old_versions failed")?;
    Ok(())
}

/// `findPreviousCounterparty` (§4.2): the counterparty of the row with the
/// greatest `ref_id` strictly less than `before_ref_id` for the key.
pub async fn find_previous_counterparty<'e, E>(
    exec: E,
    business_id: &str,
    pts: &str,
    processing_entity: &str,
    before_ref_id: i64,
) -> Result<Option<String>>
where
    E: PgExecutor<'e>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        select counterparty_id
        from settlement
        where business_id = $1
          and pts = $2
          and processing_entity = $3
          and ref_id < $4
        order by ref_id desc
        limit 1
        "#,
    )
    .bind(business_id)
    .bind(pts)
    .bind(processing_entity)
    .bind(before_ref_id)
    .fetch_optional(exec)
    .await
    .context("find_previous_counterparty failed")?;

    Ok(row.map(|(cp,)| cp))
}

/// The version of the row with the greatest `ref_id` strictly less than
/// `before_ref_id` for the key — the version a new version's implicit
/// approval reset (§4.6) applies to. `None` when this is the first version
/// ever seen for the key.
pub async fn find_previous_version<'e, E>(
    exec: E,
    business_id: &str,
    pts: &str,
    processing_entity: &str,
    before_ref_id: i64,
) -> Result<Option<i32>>
where
    E: PgExecutor<'e>,
{
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        select version
        from settlement
        where business_id = $1
          and pts = $2
          and processing_entity = $3
          and ref_id < $4
        order by ref_id desc
        limit 1
        "#,
    )
    .bind(business_id)
    .bind(pts)
    .bind(processing_entity)
    .bind(before_ref_id)
    .fetch_optional(exec)
    .await
    .context("find_previous_version failed")?;

    Ok(row.map(|(version,)| version))
}

/// `scanLatestEligible(groupKey, at_ref_id)` (§4.2).
///
/// For the given group, returns exactly one row per `business_id` — the one with
/// the greatest `version` among rows with `ref_id <= at_ref_id` in that
/// `(pts, entity, counterparty, value_date)` — subject to
/// `direction in RuleBook.directions and business_status in RuleBook.statuses`.
///
/// The selection **does not** read `is_old`: it partitions on
/// `(business_id, pts, entity)` to find each business_id's max-version row as of
/// `at_ref_id`, ties broken by greater `ref_id`, and only then filters to rows whose
/// group matches the one being scanned. A business_id whose max-version row has
/// migrated to a different group therefore contributes nothing here — exactly the
/// counterparty-migration edge case in §4.2.
pub async fn scan_latest_eligible<'e, E>(
    exec: E,
    group: &GroupKey,
    at_ref_id: i64,
    eligible_directions: &[Direction],
    eligible_statuses: &[BusinessStatus],
) -> Result<Vec<(String, Decimal)>>
where
    E: PgExecutor<'e>,
{
    let directions: Vec<&'static str> = eligible_directions
        .iter()
        .copied()
        .map(direction_str)
        .collect();
    let statuses: Vec<&'static str> = eligible_statuses
        .iter()
        .copied()
        .map(business_status_str)
        .collect();

    let rows = sqlx::query(
        r#"
        with latest_per_business as (
            select distinct on (business_id, pts, processing_entity)
                business_id, pts, processing_entity, counterparty_id, value_date,
                currency, amount, direction, business_status
            from settlement
            where pts = $1
              and processing_entity = $2
              and ref_id <= $5
            order by business_id, pts, processing_entity, version desc, ref_id desc
        )
        select currency, amount
        from latest_per_business
        where counterparty_id = $3
          and value_date = $4
          and direction = any($6)
          and business_status = any($7)
        "#,
    )
    .bind(&group.pts)
    .bind(&group.processing_entity)
    .bind(&group.counterparty_id)
    .bind(group.value_date)
    .bind(at_ref_id)
    .bind(&directions)
    .bind(&statuses)
    .fetch_all(exec)
    .await
    .context("scan_latest_eligible failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let currency: String = row.try_get("currency")?;
        let amount: Decimal = row.try_get("amount")?;
        out.push((currency, amount));
    }
    Ok(out)
}

/// Fetch the current latest-version (`is_old = false`) settlement for a business_id,
/// used by `QuerySettlement` (§6) and the Status Deriver's settlement input.
pub async fn fetch_latest_settlement<'e, E>(
    exec: E,
    business_id: &str,
) -> Result<Option<Settlement>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        select ref_id, business_id, version, pts, processing_entity, counterparty_id,
               value_date, currency, amount, direction, settlement_type, business_status,
               is_old, created_at, updated_at
        from settlement
        where business_id = $1 and is_old = false
        "#,
    )
    .bind(business_id)
    .fetch_optional(exec)
    .await
    .context("fetch_latest_settlement failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_settlement(row)?))
}

/// Fetch one exact `(business_id, version)` row, used by `RequestRelease` and
/// `Authorize` (§4.6), which act on the version the caller names rather than
/// necessarily the current latest.
pub async fn fetch_settlement_by_version<'e, E>(
    exec: E,
    business_id: &str,
    version: i32,
) -> Result<Option<Settlement>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        select ref_id, business_id, version, pts, processing_entity, counterparty_id,
               value_date, currency, amount, direction, settlement_type, business_status,
               is_old, created_at, updated_at
        from settlement
        where business_id = $1 and version = $2
        "#,
    )
    .bind(business_id)
    .bind(version)
    .fetch_optional(exec)
    .await
    .context("fetch_settlement_by_version failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_settlement(row)?))
}

/// The current global maximum `ref_id` in the settlement sequence, i.e. the
/// `ref_id` of the most recently ingested settlement across every key. Used
/// by `RecalculateScope` (§6) to recompute "as of now" rather than "as of
/// whatever watermark the stale row already carries" — the latter would
/// reproduce the exact stale total the operation exists to fix.
pub async fn current_max_ref_id<'e, E>(exec: E) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let (max,): (Option<i64>,) = sqlx::query_as("select max(ref_id) from settlement")
        .fetch_one(exec)
        .await
        .context("current_max_ref_id failed")?;
    Ok(max.unwrap_or(0))
}

fn row_to_settlement(row: sqlx::postgres::PgRow) -> Result<Settlement> {
    Ok(Settlement {
        ref_id: row.try_get("ref_id")?,
        business_id: row.try_get("business_id")?,
        version: row.try_get("version")?,
        pts: row.try_get("pts")?,
        processing_entity: row.try_get("processing_entity")?,
        counterparty_id: row.try_get("counterparty_id")?,
        value_date: row.try_get("value_date")?,
        currency: row.try_get("currency")?,
        amount: row.try_get("amount")?,
        direction: parse_direction(&row.try_get::<String, _>("direction")?)?,
        settlement_type: parse_settlement_type(&row.try_get::<String, _>("settlement_type")?)?,
        business_status: parse_business_status(&row.try_get::<String, _>("business_status")?)?,
        is_old: row.try_get("is_old")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::Pay => "PAY",
        Direction::Receive => "RECEIVE",
    }
}

pub fn settlement_type_str(t: SettlementType) -> &'static str {
    match t {
        SettlementType::Gross => "GROSS",
        SettlementType::Net => "NET",
    }
}

pub fn business_status_str(s: BusinessStatus) -> &'static str {
    match s {
        BusinessStatus::Pending => "PENDING",
        BusinessStatus::Invalid => "INVALID",
        BusinessStatus::Verified => "VERIFIED",
        BusinessStatus::Cancelled => "CANCELLED",
    }
}

pub fn parse_direction(s: &str) -> Result<Direction> {
    match s {
        "PAY" => Ok(Direction::Pay),
        "RECEIVE" => Ok(Direction::Receive),
        other => anyhow::bail!("invalid direction: {other}"),
    }
}

pub fn parse_settlement_type(s: &str) -> Result<SettlementType> {
    match s {
        "GROSS" => Ok(SettlementType::Gross),
        "NET" => Ok(SettlementType::Net),
        other => anyhow::bail!("invalid settlement_type: {other}"),
    }
}

pub fn parse_business_status(s: &str) -> Result<BusinessStatus> {
    match s {
        "PENDING" => Ok(BusinessStatus::Pending),
        "INVALID" => Ok(BusinessStatus::Invalid),
        "VERIFIED" => Ok(BusinessStatus::Verified),
        "CANCELLED" => Ok(BusinessStatus::Cancelled),
        other => anyhow::bail!("invalid business_status: {other}"),
    }
}
