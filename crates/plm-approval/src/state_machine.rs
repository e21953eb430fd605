//! Approval state machine — §4.6.
//!
//! Every transition is evaluated by a pure function with no IO, no clock
//! reads beyond what the caller supplies, and no randomness — mirroring the
//! explicit OMS order state machine this crate is grounded on. There is no
//! in-memory `Approval` struct mutated in place here: the caller always holds
//! the authoritative row from storage and passes it in; this module only
//! decides whether a requested transition is legal and, if so, what the
//! caller should persist.
//!
//! ```text
//!   BLOCKED ──REQUEST_RELEASE──► PENDING_AUTHORISE ──AUTHORISE──► AUTHORISED
//! ```
//!
//! A new `version` landing always starts a fresh row with no Approval entry
//! (§4.6 "implicit reset"); that reset is a delete performed by the caller,
//! not a transition modeled here.

use chrono::{DateTime, Utc};

use plm_schemas::{Approval, BusinessStatus, Direction, Settlement};

/// Why a requested transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRefusal {
    /// REQUEST_RELEASE requires `business_status = VERIFIED`.
    NotVerified,
    /// REQUEST_RELEASE requires `direction = PAY`.
    NotPay,
    /// REQUEST_RELEASE requires the settlement to currently be BLOCKED.
    NotBlocked,
    /// REQUEST_RELEASE requires no existing Approval row for this version.
    AlreadyRequested,
    /// AUTHORISE requires a prior REQUEST_RELEASE.
    NotRequested,
    /// AUTHORISE requires the row not already be authorised.
    AlreadyAuthorised,
    /// Segregation of duties: requester and authoriser must differ.
    SegregationOfDuties,
}

impl std::fmt::Display for ApprovalRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ApprovalRefusal::NotVerified => "settlement is not VERIFIED",
            ApprovalRefusal::NotPay => "settlement is not a PAY",
            ApprovalRefusal::NotBlocked => "settlement is not currently BLOCKED",
            ApprovalRefusal::AlreadyRequested => "a release has already been requested for this version",
            ApprovalRefusal::NotRequested => "no release has been requested for this version",
            ApprovalRefusal::AlreadyAuthorised => "this version has already been authorised",
            ApprovalRefusal::SegregationOfDuties => "requester and authoriser must be different users",
        };
        write!(f, "APPROVAL_REFUSED: {msg}")
    }
}

impl std::error::Error for ApprovalRefusal {}

/// The write the caller should persist once a transition is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReleaseWrite {
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub request_comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoriseWrite {
    pub authorized_by: String,
    pub authorized_at: DateTime<Utc>,
    pub authorize_comment: String,
}

/// `BLOCKED → PENDING_AUTHORISE` (§4.6).
///
/// `is_blocked` is the caller-computed `plm_status::derive_status(...) ==
/// DerivedStatus::Blocked` — this module does not recompute it, since that
/// would require the group total and limit this crate does not hold.
pub fn check_request_release(
    settlement: &Settlement,
    is_blocked: bool,
    existing_approval: Option<&Approval>,
    requested_by: &str,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<RequestReleaseWrite, ApprovalRefusal> {
    if settlement.business_status != BusinessStatus::Verified {
        return Err(ApprovalRefusal::NotVerified);
    }
    if settlement.direction != Direction::Pay {
        return Err(ApprovalRefusal::NotPay);
    }
    if !is_blocked {
        return Err(ApprovalRefusal::NotBlocked);
    }
    if existing_approval.is_some() {
        return Err(ApprovalRefusal::AlreadyRequested);
    }

    Ok(RequestReleaseWrite {
        requested_by: requested_by.to_string(),
        requested_at: now,
        request_comment: comment.to_string(),
    })
}

/// `PENDING_AUTHORISE → AUTHORISED` (§4.6).
pub fn check_authorise(
    existing_approval: Option<&Approval>,
    authorized_by: &str,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<AuthoriseWrite, ApprovalRefusal> {
    let approval = existing_approval.ok_or(ApprovalRefusal::NotRequested)?;
    if !approval.is_requested() {
        return Err(ApprovalRefusal::NotRequested);
    }
    if approval.is_authorized() {
        return Err(ApprovalRefusal::AlreadyAuthorised);
    }

    let requested_by = approval
        .requested_by
        .as_deref()
        .ok_or(ApprovalRefusal::NotRequested)?;
    if requested_by == authorized_by {
        return Err(ApprovalRefusal::SegregationOfDuties);
    }

    Ok(AuthoriseWrite {
        authorized_by: authorized_by.to_string(),
        authorized_at: now,
        authorize_comment: comment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use plm_schemas::SettlementType;

    fn verified_pay_settlement() -> Settlement {
        Settlement {
            ref_id: 1,
            business_id: "S1".into(),
            version: 1,
            pts: "P".into(),
            processing_entity: "E".into(),
            counterparty_id: "C1".into(),
            value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            currency: "USD".into(),
            amount: rust_decimal::Decimal::new(100_00, 2),
            direction: Direction::Pay,
            settlement_type: SettlementType::Gross,
            business_status: BusinessStatus::Verified,
            is_old: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn request_release_requires_blocked_status() {
        let s = verified_pay_settlement();
        let err = check_request_release(&s, false, None, "alice", "please release", Utc::now())
            .unwrap_err();
        assert_eq!(err, ApprovalRefusal::NotBlocked);
    }

    #[test]
    fn request_release_rejects_non_verified() {
        let mut s = verified_pay_settlement();
        s.business_status = BusinessStatus::Pending;
        let err = check_request_release(&s, true, None, "alice", "please", Utc::now()).unwrap_err();
        assert_eq!(err, ApprovalRefusal::NotVerified);
    }

    #[test]
    fn request_release_rejects_receive_direction() {
        let mut s = verified_pay_settlement();
        s.direction = Direction::Receive;
        let err = check_request_release(&s, true, None, "alice", "please", Utc::now()).unwrap_err();
        assert_eq!(err, ApprovalRefusal::NotPay);
    }

    #[test]
    fn request_release_rejects_duplicate_request() {
        let s = verified_pay_settlement();
        let existing = Approval::new_empty("S1", 1);
        let err = check_request_release(&s, true, Some(&existing), "alice", "please", Utc::now())
            .unwrap_err();
        assert_eq!(err, ApprovalRefusal::AlreadyRequested);
    }

    #[test]
    fn request_release_succeeds_when_blocked_and_eligible() {
        let s = verified_pay_settlement();
        let write = check_request_release(&s, true, None, "alice", "release please", Utc::now())
            .expect("should succeed");
        assert_eq!(write.requested_by, "alice");
        assert_eq!(write.request_comment, "release please");
    }

    #[test]
    fn authorise_requires_prior_request() {
        let err = check_authorise(None, "bob", "approved", Utc::now()).unwrap_err();
        assert_eq!(err, ApprovalRefusal::NotRequested);
    }

    #[test]
    fn authorise_rejects_same_user_as_requester() {
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some("alice".into());
        approval.requested_at = Some(Utc::now());
        let err = check_authorise(Some(&approval), "alice", "approved", Utc::now()).unwrap_err();
        assert_eq!(err, ApprovalRefusal::SegregationOfDuties);
    }

    #[test]
    fn authorise_rejects_already_authorised() {
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some("alice".into());
        approval.requested_at = Some(Utc::now());
        approval.authorized_by = Some("bob".into());
        approval.authorized_at = Some(Utc::now());
        let err = check_authorise(Some(&approval), "carol", "approved", Utc::now()).unwrap_err();
        assert_eq!(err, ApprovalRefusal::AlreadyAuthorised);
    }

    #[test]
    fn authorise_succeeds_for_a_different_user() {
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some("alice".into());
        approval.requested_at = Some(Utc::now());
        let write = check_authorise(Some(&approval), "bob", "approved", Utc::now())
            .expect("should succeed");
        assert_eq!(write.authorized_by, "bob");
    }
}
