//! `RequestRelease` / `Authorize` (§4.6, §6) orchestration: gather the read
//! set `ApprovalGateway` needs, run the requested transition through it, and
//! persist the resulting write plus an ActivityLog entry.
//!
//! Unlike the ingestion pipeline, this does not hold one transaction across
//! the read-decide-write sequence: `plm_db::approval_request_release` and
//! `approval_authorise` each re-check their own preconditions against the row
//! they are about to write (including segregation-of-duties as a backstop),
//! and the `chk_approval_sod` constraint is a second backstop at the
//! database level, so a benign race loses to one of those checks rather than
//! corrupting state.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use plm_approval::ApprovalGateway;
use plm_limits::LimitBook;
use plm_schemas::{ActivityAction, DerivedStatus};
use plm_status::{derive_status, StatusInputs};

use crate::error::PlmError;

async fn load_settlement(
    pool: &PgPool,
    business_id: &str,
    version: i32,
    stage: &'static str,
) -> Result<plm_schemas::Settlement, PlmError> {
    plm_db::fetch_settlement_by_version(pool, business_id, version)
        .await
        .map_err(|source| PlmError::Fatal { stage, source })?
        .ok_or_else(|| PlmError::Validation {
            business_id: business_id.to_string(),
            version,
            stage,
            message: "no settlement exists for this (business_id, version)".to_string(),
        })
}

/// `RequestRelease(business_id, version, user_id, comment)` (§6): moves a
/// `BLOCKED` settlement to `PENDING_AUTHORISE`.
pub async fn request_release(
    pool: &PgPool,
    business_id: &str,
    version: i32,
    requested_by: &str,
    comment: &str,
    limit_book: &LimitBook,
) -> Result<DerivedStatus, PlmError> {
    let settlement = load_settlement(pool, business_id, version, "request_release/fetch_settlement").await?;
    let group = settlement.group_key();

    let running_total = plm_db::fetch_running_total(pool, &group)
        .await
        .map_err(|source| PlmError::Fatal { stage: "request_release/fetch_running_total", source })?;
    let existing_approval = plm_db::fetch_approval(pool, business_id, version)
        .await
        .map_err(|source| PlmError::Fatal { stage: "request_release/fetch_approval", source })?;
    let limit_usd = limit_book.limit_for(&settlement.counterparty_id).unwrap_or(Decimal::ZERO);

    let is_blocked = derive_status(&StatusInputs {
        settlement: &settlement,
        running_total: running_total.as_ref(),
        limit_usd,
        approval: existing_approval.as_ref(),
    }) == DerivedStatus::Blocked;

    let write = ApprovalGateway::new()
        .request_release(&settlement, is_blocked, existing_approval.as_ref(), requested_by, comment, Utc::now())
        .map_err(|refusal| PlmError::ApprovalViolation {
            business_id: business_id.to_string(),
            version,
            reason: refusal.to_string(),
        })?;

    plm_db::approval_request_release(pool, business_id, version, &write.requested_by, Some(&write.request_comment))
        .await
        .map_err(|source| PlmError::Fatal { stage: "request_release/approval_request_release", source })?;

    plm_db::append_activity(
        pool,
        requested_by,
        ActivityAction::RequestRelease,
        business_id,
        version,
        Some(comment),
        Some(&group),
    )
    .await
    .map_err(|source| PlmError::Fatal { stage: "request_release/append_activity", source })?;

    Ok(DerivedStatus::PendingAuthorise)
}

/// `Authorize(business_id, version, user_id, comment)` (§6): moves a
/// `PENDING_AUTHORISE` settlement to `AUTHORISED`, enforcing segregation of
/// duties against the persisted requester identity.
pub async fn authorise(
    pool: &PgPool,
    business_id: &str,
    version: i32,
    authorized_by: &str,
    comment: &str,
) -> Result<DerivedStatus, PlmError> {
    let settlement = load_settlement(pool, business_id, version, "authorise/fetch_settlement").await?;
    let group = settlement.group_key();

    let existing_approval = plm_db::fetch_approval(pool, business_id, version)
        .await
        .map_err(|source| PlmError::Fatal { stage: "authorise/fetch_approval", source })?;

    let write = ApprovalGateway::new()
        .authorise(existing_approval.as_ref(), authorized_by, comment, Utc::now())
        .map_err(|refusal| PlmError::ApprovalViolation {
            business_id: business_id.to_string(),
            version,
            reason: refusal.to_string(),
        })?;

    plm_db::approval_authorise(pool, business_id, version, &write.authorized_by, Some(&write.authorize_comment))
        .await
        .map_err(|source| PlmError::Fatal { stage: "authorise/approval_authorise", source })?;

    plm_db::append_activity(
        pool,
        authorized_by,
        ActivityAction::Authorise,
        business_id,
        version,
        Some(comment),
        Some(&group),
    )
    .await
    .map_err(|source| PlmError::Fatal { stage: "authorise/append_activity", source })?;

    Ok(DerivedStatus::Authorised)
}

/// Bulk `RequestRelease` (§4.6, §6): every `(business_id, version)` in
/// `items` must resolve to the same `(pts, entity, counterparty, value_date)`
/// group and pass the gate, or none are written.
pub async fn request_release_bulk(
    pool: &PgPool,
    items: &[(String, i32)],
    requested_by: &str,
    comment: &str,
    limit_book: &LimitBook,
) -> Result<Vec<DerivedStatus>, PlmError> {
    if items.is_empty() {
        return Err(PlmError::Validation {
            business_id: String::new(),
            version: 0,
            stage: "request_release_bulk/empty",
            message: "bulk request_release requires at least one business_id".to_string(),
        });
    }

    let mut settlements = Vec::with_capacity(items.len());
    for (business_id, version) in items {
        settlements.push(
            load_settlement(pool, business_id, *version, "request_release_bulk/fetch_settlement").await?,
        );
    }

    let group = settlements[0].group_key();
    if settlements.iter().any(|s| s.group_key() != group) {
        return Err(PlmError::Validation {
            business_id: settlements[0].business_id.clone(),
            version: settlements[0].version,
            stage: "request_release_bulk/group_check",
            message: "every business_id in a bulk request must share one group".to_string(),
        });
    }

    let mut running_totals = Vec::with_capacity(settlements.len());
    let mut approvals = Vec::with_capacity(settlements.len());
    for s in &settlements {
        running_totals.push(
            plm_db::fetch_running_total(pool, &s.group_key())
                .await
                .map_err(|source| PlmError::Fatal { stage: "request_release_bulk/fetch_running_total", source })?,
        );
        approvals.push(
            plm_db::fetch_approval(pool, &s.business_id, s.version)
                .await
                .map_err(|source| PlmError::Fatal { stage: "request_release_bulk/fetch_approval", source })?,
        );
    }
    let limit_usd = limit_book.limit_for(&settlements[0].counterparty_id).unwrap_or(Decimal::ZERO);

    let gate_items: Vec<_> = settlements
        .iter()
        .zip(running_totals.iter())
        .zip(approvals.iter())
        .map(|((s, rt), approval)| {
            let is_blocked = derive_status(&StatusInputs {
                settlement: s,
                running_total: rt.as_ref(),
                limit_usd,
                approval: approval.as_ref(),
            }) == DerivedStatus::Blocked;
            (s, is_blocked, approval.as_ref())
        })
        .collect();

    let writes = ApprovalGateway::new()
        .request_release_bulk(&gate_items, requested_by, comment, Utc::now())
        .map_err(|refusal| PlmError::ApprovalViolation {
            business_id: settlements[0].business_id.clone(),
            version: settlements[0].version,
            reason: refusal.to_string(),
        })?;

    for (s, write) in settlements.iter().zip(writes.iter()) {
        plm_db::approval_request_release(pool, &s.business_id, s.version, &write.requested_by, Some(&write.request_comment))
            .await
            .map_err(|source| PlmError::Fatal { stage: "request_release_bulk/approval_request_release", source })?;

        plm_db::append_activity(
            pool,
            requested_by,
            ActivityAction::RequestRelease,
            &s.business_id,
            s.version,
            Some(comment),
            Some(&group),
        )
        .await
        .map_err(|source| PlmError::Fatal { stage: "request_release_bulk/append_activity", source })?;
    }

    Ok(vec![DerivedStatus::PendingAuthorise; settlements.len()])
}

/// Bulk `Authorize` (§4.6, §6), same all-or-nothing contract as
/// `request_release_bulk`.
pub async fn authorise_bulk(
    pool: &PgPool,
    items: &[(String, i32)],
    authorized_by: &str,
    comment: &str,
) -> Result<Vec<DerivedStatus>, PlmError> {
    if items.is_empty() {
        return Err(PlmError::Validation {
            business_id: String::new(),
            version: 0,
            stage: "authorise_bulk/empty",
            message: "bulk authorise requires at least one business_id".to_string(),
        });
    }

    let mut settlements = Vec::with_capacity(items.len());
    for (business_id, version) in items {
        settlements.push(load_settlement(pool, business_id, *version, "authorise_bulk/fetch_settlement").await?);
    }

    let group = settlements[0].group_key();
    if settlements.iter().any(|s| s.group_key() != group) {
        return Err(PlmError::Validation {
            business_id: settlements[0].business_id.clone(),
            version: settlements[0].version,
            stage: "authorise_bulk/group_check",
            message: "every business_id in a bulk request must share one group".to_string(),
        });
    }

    let mut approvals = Vec::with_capacity(settlements.len());
    for s in &settlements {
        approvals.push(
            plm_db::fetch_approval(pool, &s.business_id, s.version)
                .await
                .map_err(|source| PlmError::Fatal { stage: "authorise_bulk/fetch_approval", source })?,
        );
    }

    let gate_items: Vec<_> = approvals.iter().map(|a| a.as_ref()).collect();
    let writes = ApprovalGateway::new()
        .authorise_bulk(&gate_items, authorized_by, comment, Utc::now())
        .map_err(|refusal| PlmError::ApprovalViolation {
            business_id: settlements[0].business_id.clone(),
            version: settlements[0].version,
            reason: refusal.to_string(),
        })?;

    for (s, write) in settlements.iter().zip(writes.iter()) {
        plm_db::approval_authorise(pool, &s.business_id, s.version, &write.authorized_by, Some(&write.authorize_comment))
            .await
            .map_err(|source| PlmError::Fatal { stage: "authorise_bulk/approval_authorise", source })?;

        plm_db::append_activity(
            pool,
            authorized_by,
            ActivityAction::Authorise,
            &s.business_id,
            s.version,
            Some(comment),
            Some(&group),
        )
        .await
        .map_err(|source| PlmError::Fatal { stage: "authorise_bulk/append_activity", source })?;
    }

    Ok(vec![DerivedStatus::Authorised; settlements.len()])
}
