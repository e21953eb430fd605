use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a settlement relative to this entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Pay,
    Receive,
}

/// Lifecycle status carried by the upstream trading system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BusinessStatus {
    Pending,
    Invalid,
    Verified,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementType {
    Gross,
    Net,
}

/// Derived status, never persisted; produced by `plm-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DerivedStatus {
    Created,
    Blocked,
    PendingAuthorise,
    Authorised,
}

/// Action recorded in the append-only `Activity` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Create,
    RequestRelease,
    Authorise,
    StatusReset,
    GroupMigration,
    RecalculateScope,
}

/// The tuple over which exposure is aggregated (GLOSSARY: Group).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub pts: String,
    pub processing_entity: String,
    pub counterparty_id: String,
    pub value_date: NaiveDate,
}

impl GroupKey {
    pub fn new(
        pts: impl Into<String>,
        processing_entity: impl Into<String>,
        counterparty_id: impl Into<String>,
        value_date: NaiveDate,
    ) -> Self {
        Self {
            pts: pts.into(),
            processing_entity: processing_entity.into(),
            counterparty_id: counterparty_id.into(),
            value_date,
        }
    }
}

/// One append-only row in the Settlement relation (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub ref_id: i64,
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
    pub is_old: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(
            self.pts.clone(),
            self.processing_entity.clone(),
            self.counterparty_id.clone(),
            self.value_date,
        )
    }
}

/// A not-yet-persisted settlement submission (`IngestSettlement` request, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSettlement {
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

/// One row per live group (§3 RunningTotal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTotal {
    pub pts: String,
    pub processing_entity: String,
    pub counterparty_id: String,
    pub value_date: NaiveDate,
    pub total_usd: Decimal,
    pub ref_id_watermark: i64,
    pub settlement_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl RunningTotal {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(
            self.pts.clone(),
            self.processing_entity.clone(),
            self.counterparty_id.clone(),
            self.value_date,
        )
    }
}

/// One row per `(business_id, version)` that entered the approval workflow (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub business_id: String,
    pub version: i32,
    pub requested_by: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub request_comment: Option<String>,
    pub authorized_by: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub authorize_comment: Option<String>,
}

impl Approval {
    pub fn new_empty(business_id: impl Into<String>, version: i32) -> Self {
        Self {
            business_id: business_id.into(),
            version,
            requested_by: None,
            requested_at: None,
            request_comment: None,
            authorized_by: None,
            authorized_at: None,
            authorize_comment: None,
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested_at.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized_at.is_some()
    }
}

/// Immutable audit row (§3 Activity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: String,
    pub action: ActivityAction,
    pub business_id: String,
    pub version: i32,
    pub comment: Option<String>,
    pub group_context: Option<GroupKey>,
    pub ts: DateTime<Utc>,
}

/// A single currency->USD rate entry, as held by RateBook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    pub rate_to_usd: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A single `{direction, business_status}` eligibility entry, as held by RuleBook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringRule {
    pub direction: Direction,
    pub business_status: BusinessStatus,
}

/// Per-counterparty (or flat) USD exposure limit entry, as held by LimitBook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureLimit {
    pub counterparty_id: Option<String>,
    pub limit_usd: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Result of a successful `IngestSettlement` call (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub ref_id: i64,
    pub duplicate: bool,
}

/// Result of `QuerySettlement` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementView {
    pub settlement: Settlement,
    pub derived_status: DerivedStatus,
    pub group_total_usd: Decimal,
    pub limit_usd: Decimal,
    pub approval: Option<Approval>,
}
