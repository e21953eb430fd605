//! P-SEQ and P-IDEM (§9), property-tested over `FixtureStore::ingest_settlement`.

use chrono::NaiveDate;
use plm_limits::{RateBook, RuleBook};
use plm_schemas::{BusinessStatus, Direction, NewSettlement, SettlementType};
use plm_testkit::FixtureStore;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn settlement(business_id: &str, version: i32, amount: i64) -> NewSettlement {
    NewSettlement {
        business_id: business_id.into(),
        version,
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

fn books() -> (RateBook, RuleBook) {
    (
        RateBook::new([("USD".to_string(), Decimal::ONE)]),
        RuleBook::canonical_default(),
    )
}

proptest! {
    /// P-SEQ: assigned ref_ids for a run of distinct settlements form a
    /// strictly increasing sequence without gaps.
    #[test]
    fn ref_ids_are_strictly_increasing_without_gaps(n in 1usize..30) {
        let mut store = FixtureStore::new();
        let (rate_book, rule_book) = books();
        let allowlist = vec!["USD".to_string()];

        for i in 0..n {
            let s = settlement(&format!("biz-{i}"), 1, 1_000_00 + i as i64);
            let outcome = store.ingest_settlement(&s, &allowlist, &rate_book, &rule_book).unwrap();
            prop_assert!(!outcome.duplicate);
            prop_assert_eq!(outcome.ref_id, (i + 1) as i64);
        }
    }

    /// P-IDEM: resubmitting the exact same (business_id, pts, entity,
    /// version, payload) k times leaves the same state as submitting once,
    /// and always returns the same ref_id.
    #[test]
    fn resubmitting_an_identical_settlement_k_times_is_a_no_op_after_the_first(k in 1usize..6, amount in 1i64..10_000_000) {
        let mut store = FixtureStore::new();
        let (rate_book, rule_book) = books();
        let allowlist = vec!["USD".to_string()];
        let s = settlement("biz-idem", 1, amount);

        let first = store.ingest_settlement(&s, &allowlist, &rate_book, &rule_book).unwrap();
        prop_assert!(!first.duplicate);

        for _ in 1..k {
            let repeat = store.ingest_settlement(&s, &allowlist, &rate_book, &rule_book).unwrap();
            prop_assert!(repeat.duplicate);
            prop_assert_eq!(repeat.ref_id, first.ref_id);
        }

        prop_assert_eq!(store.settlements().len(), 1);
        prop_assert_eq!(store.activity_log().len(), 1, "only the first ingest appends a CREATE activity entry");
    }
}
