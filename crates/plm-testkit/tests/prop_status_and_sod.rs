//! P-STATUS and P-SOD (§9).
//!
//! P-STATUS is exercised end to end through `FixtureStore`: mutating only
//! the group total toggles `CREATED ⇄ BLOCKED`, and mutating only approval
//! walks `BLOCKED → PENDING_AUTHORISE → AUTHORISED`. P-SOD is checked
//! directly against `plm_approval::check_authorise`, the single place a
//! requester/authoriser pair is ever accepted.

use chrono::{NaiveDate, Utc};
use plm_approval::{check_authorise, ApprovalRefusal};
use plm_limits::{LimitBook, RateBook, RuleBook};
use plm_schemas::{Approval, BusinessStatus, DerivedStatus, Direction, NewSettlement, SettlementType};
use plm_testkit::FixtureStore;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn settlement(business_id: &str, amount: i64) -> NewSettlement {
    NewSettlement {
        business_id: business_id.into(),
        version: 1,
        pts: "P".into(),
        processing_entity: "E".into(),
        counterparty_id: "C1".into(),
        value_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        currency: "USD".into(),
        amount: Decimal::new(amount, 2),
        direction: Direction::Pay,
        settlement_type: SettlementType::Gross,
        business_status: BusinessStatus::Verified,
    }
}

proptest! {
    /// Mutating only the group total (by adding/withdrawing contributions)
    /// must only ever move derived status between `CREATED` and `BLOCKED`
    /// for a settlement with no approval on file.
    #[test]
    fn group_total_alone_only_toggles_created_and_blocked(
        under_limit_amount in 1i64..499_999_999_00i64,
        over_limit_amount in 500_000_001_00i64..600_000_000_00i64,
    ) {
        let mut store = FixtureStore::new();
        let rate_book = RateBook::new([("USD".to_string(), Decimal::ONE)]);
        let rule_book = RuleBook::canonical_default();
        let limit_book = LimitBook::flat(Decimal::new(500_000_000_00, 2));
        let allowlist = vec!["USD".to_string()];

        store.ingest_settlement(&settlement("biz-status", under_limit_amount), &allowlist, &rate_book, &rule_book).unwrap();
        let under = store.query_settlement("biz-status", &limit_book).unwrap().derived_status;
        prop_assert_eq!(under, DerivedStatus::Created);

        store.ingest_settlement(
            &NewSettlement { version: 2, ..settlement("biz-status", over_limit_amount) },
            &allowlist,
            &rate_book,
            &rule_book,
        ).unwrap();
        let over = store.query_settlement("biz-status", &limit_book).unwrap().derived_status;
        prop_assert_eq!(over, DerivedStatus::Blocked);
    }

    /// P-SOD: `check_authorise` never accepts a pair where the requester and
    /// the acting authoriser are the same identity.
    #[test]
    fn authorise_never_accepts_an_identical_requester_and_authoriser(user_id in "[a-z]{3,12}") {
        let mut approval = Approval::new_empty("S1", 1);
        approval.requested_by = Some(user_id.clone());
        approval.requested_at = Some(Utc::now());

        let result = check_authorise(Some(&approval), &user_id, "approved", Utc::now());
        prop_assert_eq!(result.unwrap_err(), ApprovalRefusal::SegregationOfDuties);
    }
}

#[test]
fn request_release_then_authorise_walks_blocked_to_authorised() {
    let mut store = FixtureStore::new();
    let rate_book = RateBook::new([("USD".to_string(), Decimal::ONE)]);
    let rule_book = RuleBook::canonical_default();
    let limit_book = LimitBook::flat(Decimal::new(100_00, 2));
    let allowlist = vec!["USD".to_string()];

    store.ingest_settlement(&settlement("biz-walk", 200_00), &allowlist, &rate_book, &rule_book).unwrap();
    assert_eq!(store.query_settlement("biz-walk", &limit_book).unwrap().derived_status, DerivedStatus::Blocked);

    store.request_release("biz-walk", 1, "alice", "release", &limit_book).unwrap();
    assert_eq!(store.query_settlement("biz-walk", &limit_book).unwrap().derived_status, DerivedStatus::PendingAuthorise);

    store.authorise("biz-walk", 1, "bob", "approved").unwrap();
    assert_eq!(store.query_settlement("biz-walk", &limit_book).unwrap().derived_status, DerivedStatus::Authorised);

    for row in store.activity_log() {
        if let Some(requested_by) = store.approval("biz-walk", row.version).and_then(|a| a.requested_by.as_deref()) {
            if let Some(authorized_by) = store.approval("biz-walk", row.version).and_then(|a| a.authorized_by.as_deref()) {
                assert_ne!(requested_by, authorized_by);
            }
        }
    }
}
