//! §9 scenario 3 (Counterparty migration): a version that changes
//! `counterparty_id` drains the old group, credits the new one, and resets
//! any standing approval via a `GROUP_MIGRATION` activity entry.

use chrono::NaiveDate;
use plm_limits::{RateBook, RuleBook};
use plm_schemas::{ActivityAction, BusinessStatus, Direction, ExchangeRate, GroupKey, NewSettlement, SettlementType};
use plm_testkit::FixtureStore;
use rust_decimal::Decimal;

fn settlement(version: i32, counterparty_id: &str, amount: i64) -> NewSettlement {
    NewSettlement {
        business_id: "S1".into(),
        version,
        pts: "P".into(),
        processing_entity: "E".into(),
        counterparty_id: counterparty_id.into(),
        value_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        currency: "EUR".into(),
        amount: Decimal::new(amount, 2),
        direction: Direction::Pay,
        settlement_type: SettlementType::Gross,
        business_status: BusinessStatus::Verified,
    }
}

#[test]
fn changing_counterparty_migrates_the_group_total_and_resets_approval() {
    let mut store = FixtureStore::new();
    let rate_book = RateBook::from_rows(&[ExchangeRate {
        currency: "EUR".into(),
        rate_to_usd: Decimal::new(1_085, 3),
        updated_at: chrono::Utc::now(),
    }]);
    let rule_book = RuleBook::canonical_default();
    let allowlist = vec!["EUR".to_string()];

    store.ingest_settlement(&settlement(1, "C1", 1_000_000_00), &allowlist, &rate_book, &rule_book).expect("v1");
    store.ingest_settlement(&settlement(2, "C1", 2_000_000_00), &allowlist, &rate_book, &rule_book).expect("v2");
    let outcome = store
        .ingest_settlement(&settlement(3, "C2", 3_000_000_00), &allowlist, &rate_book, &rule_book)
        .expect("v3 migrates to C2");

    assert_eq!(outcome.ref_id, 3);

    let old_group = GroupKey::new("P", "E", "C1", NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    let new_group = GroupKey::new("P", "E", "C2", NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

    let old_rt = store.running_total(&old_group).expect("old group still tracked");
    assert_eq!(old_rt.total_usd, Decimal::ZERO);
    assert_eq!(old_rt.ref_id_watermark, 3);

    let new_rt = store.running_total(&new_group).expect("new group tracked");
    assert_eq!(new_rt.total_usd, Decimal::new(3_255_000_00, 2));
    assert_eq!(new_rt.ref_id_watermark, 3);

    let migration_entries: Vec<_> = store
        .activity_log()
        .iter()
        .filter(|a| a.action == ActivityAction::GroupMigration)
        .collect();
    assert_eq!(migration_entries.len(), 1);

    // v2 supersedes v1 and v3 supersedes v2: two implicit resets, neither of
    // which coincides with v1 (nothing precedes it).
    let reset_entries: Vec<_> = store
        .activity_log()
        .iter()
        .filter(|a| a.action == ActivityAction::StatusReset)
        .collect();
    assert_eq!(reset_entries.len(), 2);
}
