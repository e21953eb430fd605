//! Request and response types for all plm-daemon HTTP endpoints (§6).
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. No business logic lives here.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use plm_schemas::{BusinessStatus, Direction, SettlementType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Field-level validation failure, returned with `400 Bad Request` (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub business_id: Option<String>,
    pub version: Option<i32>,
}

// ---------------------------------------------------------------------------
// POST /v1/settlements — IngestSettlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettlementRequest {
    pub business_id: String,
    pub version: i32,
    pub pts: String,
    pub processing_entity: String,
    pub counterparty_id: String,
    pub value_date: NaiveDate,
    pub currency: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub settlement_type: SettlementType,
    pub business_status: BusinessStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettlementResponse {
    pub ref_id: i64,
    pub duplicate: bool,
}

// ---------------------------------------------------------------------------
// GET /v1/settlements/:business_id — QuerySettlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementViewResponse {
    pub business_id: String,
    pub version: i32,
    pub ref_id: i64,
    pub derived_status: plm_schemas::DerivedStatus,
    pub group_total_usd: Decimal,
    pub limit_usd: Decimal,
    pub approval: Option<plm_schemas::Approval>,
}

impl From<plm_schemas::SettlementView> for SettlementViewResponse {
    fn from(v: plm_schemas::SettlementView) -> Self {
        Self {
            business_id: v.settlement.business_id,
            version: v.settlement.version,
            ref_id: v.settlement.ref_id,
            derived_status: v.derived_status,
            group_total_usd: v.group_total_usd,
            limit_usd: v.limit_usd,
            approval: v.approval,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/:business_id/versions/:version/request-release
// POST /v1/settlements/:business_id/versions/:version/authorize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalActionRequest {
    pub user_id: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalActionResponse {
    pub derived_status: plm_schemas::DerivedStatus,
}

// ---------------------------------------------------------------------------
// POST /v1/recalculate-scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculateScopeRequestBody {
    /// Omit to target every pts.
    #[serde(default)]
    pub pts: Option<String>,
    /// Omit to target every processing_entity.
    #[serde(default)]
    pub processing_entity: Option<String>,
    pub counterparty_id: Option<String>,
    pub value_date_from: NaiveDate,
    pub value_date_to: NaiveDate,
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculateScopeResponse {
    pub groups_recomputed: usize,
}

// ---------------------------------------------------------------------------
// POST /v1/settlements/bulk/request-release
// POST /v1/settlements/bulk/authorize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApprovalActionRequest {
    pub items: Vec<BulkApprovalItem>,
    pub user_id: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApprovalItem {
    pub business_id: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApprovalActionResponse {
    pub derived_statuses: Vec<plm_schemas::DerivedStatus>,
}
