//! End-to-end coverage of the BLOCKED -> PENDING_AUTHORISE -> AUTHORISED path
//! and segregation-of-duties enforcement (§4.6, end-to-end scenario 4).

use chrono::{NaiveDate, Utc};
use plm_approval::{ApprovalGateway, ApprovalRefusal};
use plm_schemas::{Approval, BusinessStatus, Direction, Settlement, SettlementType};

fn settlement() -> Settlement {
    Settlement {
        ref_id: 1,
        business_id: "S1".into(),
        version: 1,
        pts: "P".into(),
        processing_entity: "E".into(),
        counterparty_id: "C1".into(),
        value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        currency: "USD".into(),
        amount: rust_decimal::Decimal::new(100_000_000_00, 2),
        direction: Direction::Pay,
        settlement_type: SettlementType::Gross,
        business_status: BusinessStatus::Verified,
        is_old: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn alice_requests_then_alice_cannot_authorise_but_bob_can() {
    let gateway = ApprovalGateway::new();
    let s = settlement();

    let request = gateway
        .request_release(&s, true, None, "alice", "please release", Utc::now())
        .expect("alice's request should be accepted");

    let mut approval = Approval::new_empty(&s.business_id, s.version);
    approval.requested_by = Some(request.requested_by.clone());
    approval.requested_at = Some(request.requested_at);
    approval.request_comment = Some(request.request_comment.clone());

    let same_user_err = gateway
        .authorise(Some(&approval), "alice", "approved", Utc::now())
        .unwrap_err();
    assert_eq!(same_user_err, ApprovalRefusal::SegregationOfDuties);

    let authorised = gateway
        .authorise(Some(&approval), "bob", "approved", Utc::now())
        .expect("bob should be able to authorise");
    assert_eq!(authorised.authorized_by, "bob");
}

#[test]
fn cannot_request_release_twice_for_the_same_version() {
    let gateway = ApprovalGateway::new();
    let s = settlement();
    let mut approval = Approval::new_empty(&s.business_id, s.version);
    approval.requested_by = Some("alice".into());
    approval.requested_at = Some(Utc::now());

    let err = gateway
        .request_release(&s, true, Some(&approval), "carol", "again", Utc::now())
        .unwrap_err();
    assert_eq!(err, ApprovalRefusal::AlreadyRequested);
}
