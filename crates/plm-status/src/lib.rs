//! plm-status
//!
//! The Status Deriver (§4.5): a pure deterministic function, computed at read
//! time and never stored. Takes immutable snapshots and returns a result enum
//! with no IO, no clock, no randomness.

use plm_schemas::{Approval, BusinessStatus, DerivedStatus, Direction, RunningTotal, Settlement};

/// Everything the deriver needs for one `business_id`, gathered by the caller
/// from SettlementStore, RunningTotalStore, LimitBook, and ApprovalStore.
#[derive(Clone, Debug)]
pub struct StatusInputs<'a> {
    pub settlement: &'a Settlement,
    pub running_total: Option<&'a RunningTotal>,
    pub limit_usd: rust_decimal::Decimal,
    pub approval: Option<&'a Approval>,
}

/// `derive_status` (§4.5 pseudocode, transcribed verbatim):
///
/// ```text
/// if s.direction = RECEIVE or s.business_status = CANCELLED:  return CREATED
/// if approval exists and approval.authorized_at != None:      return AUTHORISED
/// if approval exists and approval.requested_at != None:       return PENDING_AUTHORISE
/// if group.total_usd > group.limit_usd:                       return BLOCKED
/// return CREATED
/// ```
pub fn derive_status(inputs: &StatusInputs<'_>) -> DerivedStatus {
    let s = inputs.settlement;

    if s.direction == Direction::Receive || s.business_status == BusinessStatus::Cancelled {
        return DerivedStatus::Created;
    }

    if let Some(approval) = inputs.approval {
        if approval.is_authorized() {
            return DerivedStatus::Authorised;
        }
        if approval.is_requested() {
            return DerivedStatus::PendingAuthorise;
        }
    }

    let total_usd = inputs
        .running_total
        .map(|rt| rt.total_usd)
        .unwrap_or(rust_decimal::Decimal::ZERO);

    if plm_limits::check_exposure(total_usd, inputs.limit_usd).is_err() {
        return DerivedStatus::Blocked;
    }

    DerivedStatus::Created
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use plm_schemas::SettlementType;
    use rust_decimal::Decimal;

    fn base_settlement(direction: Direction, business_status: BusinessStatus) -> Settlement {
        Settlement {
            ref_id: 1,
            business_id: "S1".into(),
            version: 1,
            pts: "P".into(),
            processing_entity: "E".into(),
            counterparty_id: "C1".into(),
            value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            currency: "EUR".into(),
            amount: Decimal::new(1_000_000_00, 2),
            direction,
            settlement_type: SettlementType::Gross,
            business_status,
            is_old: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn running_total(total_usd: Decimal) -> RunningTotal {
        RunningTotal {
            pts: "P".into(),
            processing_entity: "E".into(),
            counterparty_id: "C1".into(),
            value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            total_usd,
            ref_id_watermark: 1,
            settlement_count: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn receive_direction_is_always_created() {
        let s = base_settlement(Direction::Receive, BusinessStatus::Verified);
        let rt = running_total(Decimal::new(600_000_000_00, 2));
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: None,
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Created);
    }

    #[test]
    fn cancelled_is_always_created_regardless_of_group_total() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Cancelled);
        let rt = running_total(Decimal::new(600_000_000_00, 2));
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: None,
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Created);
    }

    #[test]
    fn over_limit_with_no_approval_is_blocked() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Verified);
        let rt = running_total(Decimal::new(550_000_000_00, 2));
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: None,
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Blocked);
    }

    #[test]
    fn requested_but_not_authorized_is_pending_authorise() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Verified);
        let rt = running_total(Decimal::new(550_000_000_00, 2));
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some("alice".into());
        approval.requested_at = Some(Utc::now());
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: Some(&approval),
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::PendingAuthorise);
    }

    #[test]
    fn authorized_wins_over_group_total() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Verified);
        let rt = running_total(Decimal::new(550_000_000_00, 2));
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some("alice".into());
        approval.requested_at = Some(Utc::now());
        approval.authorized_by = Some("bob".into());
        approval.authorized_at = Some(Utc::now());
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: Some(&approval),
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Authorised);
    }

    #[test]
    fn under_limit_with_no_approval_is_created() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Verified);
        let rt = running_total(Decimal::new(100_000_00, 2));
        let inputs = StatusInputs {
            settlement: &s,
            running_total: Some(&rt),
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: None,
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Created);
    }

    #[test]
    fn missing_running_total_is_treated_as_zero_exposure() {
        let s = base_settlement(Direction::Pay, BusinessStatus::Verified);
        let inputs = StatusInputs {
            settlement: &s,
            running_total: None,
            limit_usd: Decimal::new(500_000_000_00, 2),
            approval: None,
        };
        assert_eq!(derive_status(&inputs), DerivedStatus::Created);
    }
}
