//! `QuerySettlement` (§6): read-only composition of the latest settlement,
//! its group's running total, its limit, and its approval state into the
//! derived status a caller actually wants.

use sqlx::PgPool;

use plm_limits::LimitBook;
use plm_schemas::{DerivedStatus, SettlementView};
use plm_status::{derive_status, StatusInputs};

use crate::error::PlmError;

/// `QuerySettlement(business_id) -> SettlementView` (§6). Returns `Ok(None)`
/// when no settlement exists for `business_id` (not-found, not an error).
pub async fn query_settlement(
    pool: &PgPool,
    business_id: &str,
    limit_book: &LimitBook,
) -> Result<Option<SettlementView>, PlmError> {
    let fatal = |stage: &'static str, source: anyhow::Error| PlmError::Fatal { stage, source };

    let Some(settlement) = plm_db::fetch_latest_settlement(pool, business_id)
        .await
        .map_err(|e| fatal("query_settlement/fetch_latest_settlement", e))?
    else {
        return Ok(None);
    };

    let group = settlement.group_key();

    let running_total = plm_db::fetch_running_total(pool, &group)
        .await
        .map_err(|e| fatal("query_settlement/fetch_running_total", e))?;

    let approval = plm_db::fetch_approval(pool, business_id, settlement.version)
        .await
        .map_err(|e| fatal("query_settlement/fetch_approval", e))?;

    let limit_usd = limit_book
        .limit_for(&settlement.counterparty_id)
        .unwrap_or(rust_decimal::Decimal::ZERO);

    let derived_status: DerivedStatus = derive_status(&StatusInputs {
        settlement: &settlement,
        running_total: running_total.as_ref(),
        limit_usd,
        approval: approval.as_ref(),
    });

    let group_total_usd = running_total
        .as_ref()
        .map(|rt| rt.total_usd)
        .unwrap_or(rust_decimal::Decimal::ZERO);

    Ok(Some(SettlementView {
        settlement,
        derived_status,
        group_total_usd,
        limit_usd,
        approval,
    }))
}
