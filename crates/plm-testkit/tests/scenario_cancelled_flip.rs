//! §9 scenario 6 (CANCELLED flip): a PAY/VERIFIED settlement contributing to
//! a group under its limit is `CREATED`; a new version flipping
//! `business_status` to `CANCELLED` drops the group total by the old USD
//! contribution and is itself always `CREATED` regardless of the group.

use chrono::NaiveDate;
use plm_limits::{LimitBook, RateBook, RuleBook};
use plm_schemas::{BusinessStatus, DerivedStatus, Direction, ExchangeRate, GroupKey, NewSettlement, SettlementType};
use plm_testkit::FixtureStore;
use rust_decimal::Decimal;

fn settlement(version: i32, amount: i64, business_status: BusinessStatus) -> NewSettlement {
    NewSettlement {
        business_id: "S1".into(),
        version,
        pts: "P".into(),
        processing_entity: "E".into(),
        counterparty_id: "C1".into(),
        value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        currency: "USD".into(),
        amount: Decimal::new(amount, 2),
        direction: Direction::Pay,
        settlement_type: SettlementType::Gross,
        business_status,
    }
}

#[test]
fn cancelling_a_settlement_removes_its_contribution_and_is_always_created() {
    let mut store = FixtureStore::new();
    let rate_book = RateBook::from_rows(&[ExchangeRate {
        currency: "USD".into(),
        rate_to_usd: Decimal::ONE,
        updated_at: chrono::Utc::now(),
    }]);
    let rule_book = RuleBook::canonical_default();
    let limit_book = LimitBook::flat(Decimal::new(500_000_000_00, 2));
    let allowlist = vec!["USD".to_string()];

    // Other settlements already bring this group to 350M USD, under the 500M limit.
    store
        .ingest_settlement(
            &NewSettlement { business_id: "S0".into(), ..settlement(1, 350_000_000_00, BusinessStatus::Verified) },
            &allowlist,
            &rate_book,
            &rule_book,
        )
        .expect("seed group total");

    store
        .ingest_settlement(&settlement(1, 100_000_000_00, BusinessStatus::Verified), &allowlist, &rate_book, &rule_book)
        .expect("ingest v1");

    let view = store.query_settlement("S1", &limit_book).expect("view v1");
    assert_eq!(view.derived_status, DerivedStatus::Created);
    assert_eq!(view.group_total_usd, Decimal::new(450_000_000_00, 2));

    store
        .ingest_settlement(&settlement(2, 100_000_000_00, BusinessStatus::Cancelled), &allowlist, &rate_book, &rule_book)
        .expect("ingest v2 cancelled");

    let group = GroupKey::new("P", "E", "C1", NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    let rt = store.running_total(&group).expect("running total");
    assert_eq!(rt.total_usd, Decimal::new(350_000_000_00, 2), "cancelling must drop the old USD contribution");

    let v1 = store.fetch_settlement_by_version("S1", 1).expect("v1 row");
    assert!(v1.is_old);

    let view = store.query_settlement("S1", &limit_book).expect("view v2");
    assert_eq!(view.derived_status, DerivedStatus::Created, "a CANCELLED version is always CREATED");
}
