//! P-MIGRATE (§9): a counterparty change at `ref_id = R` must, after the
//! ingestion transaction, drain the old group (observed at watermark ≥ R)
//! and credit the new group with the new version's contribution.

use chrono::NaiveDate;
use plm_limits::{RateBook, RuleBook};
use plm_schemas::{BusinessStatus, Direction, GroupKey, NewSettlement, SettlementType};
use plm_testkit::FixtureStore;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn settlement(version: i32, counterparty_id: &str, amount: i64) -> NewSettlement {
    NewSettlement {
        business_id: "biz-migrate".into(),
        version,
        pts: "P".into(),
        processing_entity: "E".into(),
        counterparty_id: counterparty_id.into(),
        value_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        currency: "USD".into(),
        amount: Decimal::new(amount, 2),
        direction: Direction::Pay,
        settlement_type: SettlementType::Gross,
        business_status: BusinessStatus::Verified,
    }
}

proptest! {
    #[test]
    fn migrating_counterparty_drains_the_old_group_and_credits_the_new_one(
        first_amount in 1i64..5_000_000_00,
        second_amount in 1i64..5_000_000_00,
    ) {
        let mut store = FixtureStore::new();
        let rate_book = RateBook::new([("USD".to_string(), Decimal::ONE)]);
        let rule_book = RuleBook::canonical_default();
        let allowlist = vec!["USD".to_string()];

        let first = store
            .ingest_settlement(&settlement(1, "C1", first_amount), &allowlist, &rate_book, &rule_book)
            .unwrap();
        let second = store
            .ingest_settlement(&settlement(2, "C2", second_amount), &allowlist, &rate_book, &rule_book)
            .unwrap();

        let r = second.ref_id;
        prop_assert!(r > first.ref_id);

        let old_group = GroupKey::new("P", "E", "C1", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let new_group = GroupKey::new("P", "E", "C2", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());

        let old_rt = store.running_total(&old_group).expect("old group still tracked");
        prop_assert_eq!(old_rt.total_usd, Decimal::ZERO);
        prop_assert!(old_rt.ref_id_watermark >= r);

        let new_rt = store.running_total(&new_group).expect("new group tracked");
        prop_assert_eq!(new_rt.total_usd, Decimal::new(second_amount, 2));
        prop_assert!(new_rt.ref_id_watermark >= r);
    }
}
