//! Coverage for LimitBook mode switching and RuleBook eligibility filtering,
//! the two config snapshots the ingestion pipeline consults on every group
//! recompute (§4.2, §4.5).

use plm_limits::{check_exposure, LimitBook, RuleBook};
use plm_schemas::{BusinessStatus, Direction, ExposureLimit};
use rust_decimal::Decimal;

#[test]
fn from_rows_builds_flat_book_from_the_null_counterparty_row() {
    let rows = vec![ExposureLimit {
        counterparty_id: None,
        limit_usd: Decimal::new(500_000_000_00, 2),
        updated_at: chrono::Utc::now(),
    }];
    let book = LimitBook::from_rows(plm_config::LimitMode::Flat, &rows);
    assert_eq!(book.limit_for("CP-ANY"), Some(Decimal::new(500_000_000_00, 2)));
}

#[test]
fn from_rows_builds_per_counterparty_book_ignoring_the_flat_row() {
    let rows = vec![
        ExposureLimit {
            counterparty_id: None,
            limit_usd: Decimal::new(999_00, 2),
            updated_at: chrono::Utc::now(),
        },
        ExposureLimit {
            counterparty_id: Some("CP-1".to_string()),
            limit_usd: Decimal::new(10_000_00, 2),
            updated_at: chrono::Utc::now(),
        },
    ];
    let book = LimitBook::from_rows(plm_config::LimitMode::PerCounterparty, &rows);
    assert_eq!(book.limit_for("CP-1"), Some(Decimal::new(10_000_00, 2)));
    assert_eq!(book.limit_for("CP-2"), None);
}

#[test]
fn breach_reports_the_offending_figures() {
    let err = check_exposure(Decimal::new(550_000_000_00, 2), Decimal::new(500_000_000_00, 2))
        .expect_err("must be a breach");
    assert_eq!(err.total_usd, Decimal::new(550_000_000_00, 2));
    assert_eq!(err.limit_usd, Decimal::new(500_000_000_00, 2));
}

#[test]
fn rule_book_directions_and_statuses_reflect_loaded_rules() {
    let book = RuleBook::canonical_default();
    assert_eq!(book.directions(), vec![Direction::Pay]);
    let mut statuses = book.statuses();
    statuses.sort_by_key(|s| *s as u8);
    assert_eq!(
        statuses,
        vec![
            BusinessStatus::Pending,
            BusinessStatus::Invalid,
            BusinessStatus::Verified,
        ]
    );
}
