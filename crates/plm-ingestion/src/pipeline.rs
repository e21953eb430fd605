//! The Ingestion Pipeline (§4.4) — the heart of the system.
//!
//! `run_ingestion_tx` is the exact 5-step transaction body from §4.4, taking
//! an open `sqlx::Transaction` so the caller (`ingest_settlement`) owns the
//! retry loop and commit/rollback boundary — a pure per-call body separated
//! from its outer retry/backoff wrapper.

use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use plm_limits::RateBook;
use plm_schemas::{ActivityAction, GroupKey, IngestOutcome, NewSettlement};

use crate::error::PlmError;

/// Runs the §4.4 pipeline body inside `tx`. Does not commit; the caller does,
/// once outside this function, after deciding the transaction succeeded.
pub async fn run_ingestion_tx(
    tx: &mut Transaction<'_, Postgres>,
    s: &NewSettlement,
    rate_book: &RateBook,
    eligible_directions: &[plm_schemas::Direction],
    eligible_statuses: &[plm_schemas::BusinessStatus],
) -> Result<IngestOutcome, PlmError> {
    let stage = |name: &'static str| name;

    let insert = plm_db::insert_settlement(&mut **tx, s)
        .await
        .map_err(|e| transient(&s.business_id, s.version, None, stage("insert"), e))?;

    if insert.duplicate {
        info!(
            business_id = %s.business_id,
            version = s.version,
            ref_id = insert.ref_id,
            "duplicate settlement, skipping recompute"
        );
        return Ok(IngestOutcome {
            ref_id: insert.ref_id,
            duplicate: true,
        });
    }

    let r = insert.ref_id;

    plm_db::mark_old_versions(&mut **tx, &s.business_id, &s.pts, &s.processing_entity)
        .await
        .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("mark_old_versions"), e))?;

    let prev = plm_db::find_previous_counterparty(
        &mut **tx,
        &s.business_id,
        &s.pts,
        &s.processing_entity,
        r,
    )
    .await
    .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("find_previous_counterparty"), e))?;

    let prev_version = plm_db::find_previous_version(
        &mut **tx,
        &s.business_id,
        &s.pts,
        &s.processing_entity,
        r,
    )
    .await
    .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("find_previous_version"), e))?;

    let new_group = GroupKey::new(
        s.pts.clone(),
        s.processing_entity.clone(),
        s.counterparty_id.clone(),
        s.value_date,
    );

    let migrated = matches!(&prev, Some(old_cp) if old_cp != &s.counterparty_id);

    let mut groups = vec![new_group.clone()];
    if migrated {
        groups.push(GroupKey::new(
            s.pts.clone(),
            s.processing_entity.clone(),
            prev.clone().expect("migrated implies prev is Some"),
            s.value_date,
        ));
    }

    for group in &groups {
        recompute_group(
            tx,
            group,
            r,
            rate_book,
            eligible_directions,
            eligible_statuses,
            &s.business_id,
            s.version,
        )
        .await?;
    }

    plm_db::append_activity(
        &mut **tx,
        "ingestion-pipeline",
        ActivityAction::Create,
        &s.business_id,
        s.version,
        None,
        Some(&new_group),
    )
    .await
    .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("append_activity(create)"), e))?;

    if migrated {
        let old_group = groups
            .get(1)
            .expect("migrated groups always has the old group at index 1");
        plm_db::append_activity(
            &mut **tx,
            "ingestion-pipeline",
            ActivityAction::GroupMigration,
            &s.business_id,
            s.version,
            Some(&format!(
                "migrated from {} to {}",
                old_group.counterparty_id, s.counterparty_id
            )),
            Some(&new_group),
        )
        .await
        .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("append_activity(migration)"), e))?;
    }

    // Implicit reset (§4.6): any new version invalidates whatever approval
    // stood on the version it supersedes, even when the group didn't change.
    if let Some(prev_version) = prev_version {
        plm_db::approval_reset(&mut **tx, &s.business_id, prev_version)
            .await
            .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("approval_reset"), e))?;

        plm_db::append_activity(
            &mut **tx,
            "ingestion-pipeline",
            ActivityAction::StatusReset,
            &s.business_id,
            s.version,
            Some(&format!("approval on version {prev_version} superseded")),
            Some(&new_group),
        )
        .await
        .map_err(|e| transient(&s.business_id, s.version, Some(r), stage("append_activity(status_reset)"), e))?;
    }

    Ok(IngestOutcome {
        ref_id: r,
        duplicate: false,
    })
}

/// Recomputes one group's `RunningTotal` from current state: `scanLatestEligible
/// -> sum-converted-to-USD -> upsert` (§4.2/§4.3/§4.4). Shared by the ingestion
/// pipeline (one or two groups per settlement) and `RecalculateScope`
/// (every group in the requested scope).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn recompute_group(
    tx: &mut Transaction<'_, Postgres>,
    group: &GroupKey,
    at_ref_id: i64,
    rate_book: &RateBook,
    eligible_directions: &[plm_schemas::Direction],
    eligible_statuses: &[plm_schemas::BusinessStatus],
    business_id: &str,
    version: i32,
) -> Result<(), PlmError> {
    let rows = plm_db::scan_latest_eligible(
        &mut **tx,
        group,
        at_ref_id,
        eligible_directions,
        eligible_statuses,
    )
    .await
    .map_err(|e| transient(business_id, version, Some(at_ref_id), "scan_latest_eligible", e))?;

    let mut total = Decimal::ZERO;
    let count = rows.len() as i32;
    for (currency, amount) in &rows {
        let Some(rate) = rate_book.rate_for(currency) else {
            warn!(currency = %currency, group = ?group, "missing exchange rate");
            return Err(PlmError::MissingRate {
                business_id: business_id.to_string(),
                version,
                ref_id: Some(at_ref_id),
                stage: "recompute_group",
                currency: currency.clone(),
            });
        };
        total += *amount * rate;
    }
    let total = total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    plm_db::upsert_running_total(&mut **tx, group, total, count, at_ref_id)
        .await
        .map_err(|e| transient(business_id, version, Some(at_ref_id), "upsert_running_total", e))?;

    Ok(())
}

/// Classifies a storage-layer failure as `TransientStorage` (serialization
/// failure / deadlock — safe to retry, §7) or `Fatal` (anything else: schema
/// drift, a constraint violation that should never happen given validation,
/// a dropped connection).
fn transient(
    business_id: &str,
    version: i32,
    ref_id: Option<i64>,
    stage: &'static str,
    source: anyhow::Error,
) -> PlmError {
    let is_transient = source
        .chain()
        .find_map(|e| e.downcast_ref::<sqlx::Error>())
        .is_some_and(crate::error::is_transient_storage_error);

    if is_transient {
        PlmError::TransientStorage {
            business_id: business_id.to_string(),
            version,
            ref_id,
            stage,
            source,
        }
    } else {
        PlmError::Fatal { stage, source }
    }
}
