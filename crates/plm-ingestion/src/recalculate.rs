//! `RecalculateScope` (§6): the operator-facing manual recomputation trigger.
//! Enumerates every group in `RunningTotal` matching the requested scope and
//! reruns `scanLatestEligible -> sum -> upsert` for each, at the current max
//! `ref_id`. The only recomputation path when rules/limits change — there is
//! no auto-propagation (decision recorded in DESIGN.md).

use sqlx::PgPool;
use tracing::info;

use plm_limits::{RateBook, RuleBook};
use plm_reconcile::{filter_groups_in_scope, RecalculateScopeRequest};
use plm_schemas::ActivityAction;

use crate::error::PlmError;
use crate::pipeline::recompute_group;

/// Result of one `RecalculateScope` run: the number of groups recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculateOutcome {
    pub groups_recomputed: usize,
}

/// Runs `RecalculateScope` inside a single transaction: every matching group is
/// recomputed against the current maximum `ref_id`, and one ActivityLog entry
/// records the operation as a whole.
pub async fn recalculate_scope(
    pool: &PgPool,
    request: &RecalculateScopeRequest,
    user_id: &str,
    reason: &str,
    rate_book: &RateBook,
    rule_book: &RuleBook,
) -> Result<RecalculateOutcome, PlmError> {
    let fatal = |stage: &'static str, source: anyhow::Error| PlmError::Fatal { stage, source };

    let mut tx = pool.begin().await.map_err(|e| {
        fatal("recalculate_scope/begin_transaction", anyhow::Error::new(e))
    })?;

    let candidates = plm_db::list_running_totals_in_scope(
        &mut *tx,
        request.pts.as_deref(),
        request.processing_entity.as_deref(),
        request.counterparty_id.as_deref(),
    )
    .await
    .map_err(|e| fatal("recalculate_scope/list_running_totals_in_scope", e))?;

    let groups = filter_groups_in_scope(
        request,
        candidates.iter().map(|rt| rt.group_key()),
    );

    let max_ref_id = plm_db::current_max_ref_id(&mut *tx)
        .await
        .map_err(|e| fatal("recalculate_scope/current_max_ref_id", e))?;

    let directions = rule_book.directions();
    let statuses = rule_book.statuses();

    for group in &groups {
        recompute_group(
            &mut tx,
            group,
            max_ref_id,
            rate_book,
            &directions,
            &statuses,
            "RECALCULATE_SCOPE",
            0,
        )
        .await?;
    }

    plm_db::append_activity(
        &mut *tx,
        user_id,
        ActivityAction::RecalculateScope,
        "RECALCULATE_SCOPE",
        0,
        Some(reason),
        None,
    )
    .await
    .map_err(|e| fatal("recalculate_scope/append_activity", e))?;

    tx.commit()
        .await
        .map_err(|e| fatal("recalculate_scope/commit", anyhow::Error::new(e)))?;

    info!(groups = groups.len(), user_id, "RecalculateScope completed");

    Ok(RecalculateOutcome {
        groups_recomputed: groups.len(),
    })
}
