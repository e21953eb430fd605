//! RecalculateScope group-enumeration logic (§6).
//!
//! `RecalculateScope(pts?, entity?, counterparty?, value_date_from, value_date_to, ...)`
//! is specified as "enumerate distinct groups in RunningTotal matching the
//! scope". The SQL fetch (`plm-db::list_running_totals_in_scope`) narrows by
//! `(pts, entity[, counterparty])`; this module applies the remaining,
//! purely-in-memory filter — the value-date range — so the date-range
//! semantics are unit-testable without a database and are identical whether
//! the caller is the HTTP route or the `plm-cli recalc` command.

use chrono::NaiveDate;

use plm_schemas::GroupKey;

/// A `RecalculateScope` request (§6). `pts`, `processing_entity` and
/// `counterparty_id` are each optional scope dimensions — omitting one
/// matches every value for it, so a request can target a single group, every
/// group under one pts/entity, or the entire book.
#[derive(Debug, Clone)]
pub struct RecalculateScopeRequest {
    pub pts: Option<String>,
    pub processing_entity: Option<String>,
    pub counterparty_id: Option<String>,
    pub value_date_from: NaiveDate,
    pub value_date_to: NaiveDate,
}

impl RecalculateScopeRequest {
    pub fn matches(&self, group: &GroupKey) -> bool {
        if let Some(pts) = &self.pts {
            if &group.pts != pts {
                return false;
            }
        }
        if let Some(entity) = &self.processing_entity {
            if &group.processing_entity != entity {
                return false;
            }
        }
        if let Some(cp) = &self.counterparty_id {
            if &group.counterparty_id != cp {
                return false;
            }
        }
        group.value_date >= self.value_date_from && group.value_date <= self.value_date_to
    }
}

/// Filters a set of candidate groups (typically every group sharing
/// `(pts, entity[, counterparty])`, as fetched from storage) down to those
/// inside the requested value-date range.
pub fn filter_groups_in_scope(
    request: &RecalculateScopeRequest,
    candidates: impl IntoIterator<Item = GroupKey>,
) -> Vec<GroupKey> {
    candidates
        .into_iter()
        .filter(|g| request.matches(g))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(cp: &str, date: NaiveDate) -> GroupKey {
        GroupKey::new("SWIFT", "ENT-1", cp, date)
    }

    #[test]
    fn matches_requires_same_pts_and_entity() {
        let req = RecalculateScopeRequest {
            pts: Some("SWIFT".into()),
            processing_entity: Some("ENT-1".into()),
            counterparty_id: None,
            value_date_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value_date_to: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        let other_entity = GroupKey::new(
            "SWIFT",
            "ENT-2",
            "CP-1",
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        );
        assert!(!req.matches(&other_entity));
    }

    #[test]
    fn matches_restricts_to_named_counterparty_when_given() {
        let req = RecalculateScopeRequest {
            pts: Some("SWIFT".into()),
            processing_entity: Some("ENT-1".into()),
            counterparty_id: Some("CP-1".into()),
            value_date_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value_date_to: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        let d = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        assert!(req.matches(&group("CP-1", d)));
        assert!(!req.matches(&group("CP-2", d)));
    }

    #[test]
    fn matches_respects_the_value_date_range() {
        let req = RecalculateScopeRequest {
            pts: Some("SWIFT".into()),
            processing_entity: Some("ENT-1".into()),
            counterparty_id: None,
            value_date_from: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            value_date_to: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
        };
        assert!(!req.matches(&group("CP-1", NaiveDate::from_ymd_opt(2026, 1, 9).unwrap())));
        assert!(req.matches(&group("CP-1", NaiveDate::from_ymd_opt(2026, 1, 10).unwrap())));
        assert!(req.matches(&group("CP-1", NaiveDate::from_ymd_opt(2026, 1, 20).unwrap())));
        assert!(!req.matches(&group("CP-1", NaiveDate::from_ymd_opt(2026, 1, 21).unwrap())));
    }

    #[test]
    fn filter_groups_in_scope_keeps_only_matching_groups() {
        let req = RecalculateScopeRequest {
            pts: Some("SWIFT".into()),
            processing_entity: Some("ENT-1".into()),
            counterparty_id: None,
            value_date_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value_date_to: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        let d = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let candidates = vec![
            group("CP-1", d),
            GroupKey::new("SWIFT", "ENT-2", "CP-1", d),
            group("CP-2", NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
        ];
        let kept = filter_groups_in_scope(&req, candidates);
        assert_eq!(kept, vec![group("CP-1", d)]);
    }

    #[test]
    fn omitting_pts_and_entity_matches_every_pts_and_entity() {
        let req = RecalculateScopeRequest {
            pts: None,
            processing_entity: None,
            counterparty_id: None,
            value_date_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value_date_to: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        };
        let d = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert!(req.matches(&group("CP-1", d)));
        assert!(req.matches(&GroupKey::new("FEDWIRE", "ENT-9", "CP-2", d)));
    }
}
