//! plm-limits
//!
//! RateBook, LimitBook, and RuleBook: the three read-mostly config snapshots
//! consulted on every ingestion (§4, §5). All three are plain in-memory
//! stores rebuilt wholesale by their refreshers and swapped under a short
//! write lock by the caller (`plm-daemon::state`); this crate only holds the
//! pure lookup/decision logic.

use std::collections::BTreeMap;

use plm_config::LimitMode;
use plm_schemas::{BusinessStatus, Direction, ExchangeRate, ExposureLimit, FilteringRule};
use rust_decimal::Decimal;

/// Currency -> USD rate lookup (§3/§4.4). Holds only the latest rate per
/// currency, matching the source's fully-replaced-on-refresh snapshot.
#[derive(Clone, Debug, Default)]
pub struct RateBook {
    rates: BTreeMap<String, Decimal>,
}

impl RateBook {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    pub fn from_rows(rows: &[ExchangeRate]) -> Self {
        Self::new(rows.iter().map(|r| (r.currency.clone(), r.rate_to_usd)))
    }

    pub fn rate_for(&self, currency: &str) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }
}

/// Per-counterparty (or flat) USD exposure limit lookup.
#[derive(Clone, Debug)]
pub struct LimitBook {
    mode: LimitMode,
    flat_limit_usd: Decimal,
    per_counterparty: BTreeMap<String, Decimal>,
}

impl LimitBook {
    pub fn flat(limit_usd: Decimal) -> Self {
        Self {
            mode: LimitMode::Flat,
            flat_limit_usd: limit_usd,
            per_counterparty: BTreeMap::new(),
        }
    }

    pub fn per_counterparty(limits: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            mode: LimitMode::PerCounterparty,
            flat_limit_usd: Decimal::ZERO,
            per_counterparty: limits.into_iter().collect(),
        }
    }

    /// Build from the rows a bulk `exposure_limit` table read would hand back:
    /// `counterparty_id = None` is the flat row.
    pub fn from_rows(mode: LimitMode, rows: &[ExposureLimit]) -> Self {
        match mode {
            LimitMode::Flat => {
                let flat = rows
                    .iter()
                    .find(|r| r.counterparty_id.is_none())
                    .map(|r| r.limit_usd)
                    .unwrap_or(Decimal::ZERO);
                Self::flat(flat)
            }
            LimitMode::PerCounterparty => Self::per_counterparty(rows.iter().filter_map(|r| {
                r.counterparty_id
                    .as_ref()
                    .map(|cp| (cp.clone(), r.limit_usd))
            })),
        }
    }

    /// The USD limit applicable to a group's counterparty.
    pub fn limit_for(&self, counterparty_id: &str) -> Option<Decimal> {
        match self.mode {
            LimitMode::Flat => Some(self.flat_limit_usd),
            LimitMode::PerCounterparty => self.per_counterparty.get(counterparty_id).copied(),
        }
    }
}

/// Whether a group's USD total exceeds its limit, carrying the figures needed
/// to explain the breach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitBreach {
    pub total_usd: Decimal,
    pub limit_usd: Decimal,
}

/// `total_usd > limit_usd` (§4.5 Status Deriver's third rule).
pub fn check_exposure(total_usd: Decimal, limit_usd: Decimal) -> Result<(), LimitBreach> {
    if total_usd > limit_usd {
        Err(LimitBreach {
            total_usd,
            limit_usd,
        })
    } else {
        Ok(())
    }
}

/// The currently-eligible `{direction, business_status}` combinations (GLOSSARY:
/// Eligibility set). Canonically `direction=PAY` and
/// `business_status ∈ {PENDING, INVALID, VERIFIED}`.
#[derive(Clone, Debug, Default)]
pub struct RuleBook {
    rules: Vec<FilteringRule>,
}

impl RuleBook {
    pub fn new(rules: Vec<FilteringRule>) -> Self {
        Self { rules }
    }

    /// The canonical default set, used to seed a fresh deployment before the
    /// first refresher run populates the real table (mirrors
    /// `0002_seed_default_rules.sql`).
    pub fn canonical_default() -> Self {
        Self::new(vec![
            FilteringRule {
                direction: Direction::Pay,
                business_status: BusinessStatus::Pending,
            },
            FilteringRule {
                direction: Direction::Pay,
                business_status: BusinessStatus::Invalid,
            },
            FilteringRule {
                direction: Direction::Pay,
                business_status: BusinessStatus::Verified,
            },
        ])
    }

    pub fn is_eligible(&self, direction: Direction, business_status: BusinessStatus) -> bool {
        self.rules
            .iter()
            .any(|r| r.direction == direction && r.business_status == business_status)
    }

    pub fn directions(&self) -> Vec<Direction> {
        let mut out: Vec<Direction> = self.rules.iter().map(|r| r.direction).collect();
        out.sort_by_key(|d| *d as u8);
        out.dedup();
        out
    }

    pub fn statuses(&self) -> Vec<BusinessStatus> {
        let mut out: Vec<BusinessStatus> = self.rules.iter().map(|r| r.business_status).collect();
        out.sort_by_key(|s| *s as u8);
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_book_looks_up_by_currency_and_is_missing_for_unknown_currency() {
        let book = RateBook::new([("EUR".to_string(), Decimal::new(1_085, 3))]);
        assert_eq!(book.rate_for("EUR"), Some(Decimal::new(1_085, 3)));
        assert_eq!(book.rate_for("JPY"), None);
    }

    #[test]
    fn flat_limit_applies_to_any_counterparty() {
        let book = LimitBook::flat(Decimal::new(500_000_000_00, 2));
        assert_eq!(
            book.limit_for("CP-ANY"),
            Some(Decimal::new(500_000_000_00, 2))
        );
    }

    #[test]
    fn per_counterparty_limit_is_looked_up_by_key() {
        let book = LimitBook::per_counterparty([("CP-1".to_string(), Decimal::new(10_000_00, 2))]);
        assert_eq!(book.limit_for("CP-1"), Some(Decimal::new(10_000_00, 2)));
        assert_eq!(book.limit_for("CP-UNKNOWN"), None);
    }

    #[test]
    fn exposure_over_limit_is_a_breach() {
        let result = check_exposure(Decimal::new(550_000_000_00, 2), Decimal::new(500_000_000_00, 2));
        assert!(result.is_err());
    }

    #[test]
    fn exposure_at_or_under_limit_is_not_a_breach() {
        assert!(check_exposure(Decimal::new(500_000_000_00, 2), Decimal::new(500_000_000_00, 2)).is_ok());
        assert!(check_exposure(Decimal::new(1_00, 2), Decimal::new(500_000_000_00, 2)).is_ok());
    }

    #[test]
    fn canonical_default_matches_the_glossary_eligibility_set() {
        let book = RuleBook::canonical_default();
        assert!(book.is_eligible(Direction::Pay, BusinessStatus::Pending));
        assert!(book.is_eligible(Direction::Pay, BusinessStatus::Invalid));
        assert!(book.is_eligible(Direction::Pay, BusinessStatus::Verified));
        assert!(!book.is_eligible(Direction::Pay, BusinessStatus::Cancelled));
        assert!(!book.is_eligible(Direction::Receive, BusinessStatus::Verified));
    }
}
