//! An in-memory mirror of the ingestion pipeline (`plm-ingestion::pipeline`)
//! and the approval/recalculate-scope orchestration built on top of it,
//! backed by plain Rust collections instead of `sqlx` queries against
//! Postgres.
//!
//! `FixtureStore` exists so property and scenario tests can exercise the
//! exact §4.4 algorithm — idempotent insert, mark-old-versions,
//! previous-counterparty lookup, latest-eligible-as-of-watermark scan,
//! sum-and-round, watermark-guarded upsert, approval transitions,
//! activity logging — without a live Postgres instance. The decision logic
//! itself (status derivation, approval gating, scope filtering) is not
//! reimplemented here: it is delegated to the same pure crates
//! (`plm-status`, `plm-approval`, `plm-reconcile`, `plm-limits`) the
//! production pipeline calls, so the only code duplicated against
//! `plm-db`/`plm-ingestion` is the storage-shaped bookkeeping those crates
//! don't own.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};

use plm_approval::ApprovalGateway;
use plm_ingestion::{validation::validate_new_settlement, PlmError, RecalculateOutcome};
use plm_limits::{RateBook, RuleBook};
use plm_reconcile::{filter_groups_in_scope, RecalculateScopeRequest};
use plm_schemas::{
    Activity, ActivityAction, Approval, BusinessStatus, DerivedStatus, Direction, GroupKey,
    IngestOutcome, NewSettlement, RunningTotal, Settlement, SettlementView,
};
use plm_status::{derive_status, StatusInputs};

/// In-memory storage backing the ingestion pipeline and approval workflow.
#[derive(Debug, Default)]
pub struct FixtureStore {
    settlements: Vec<Settlement>,
    next_ref_id: i64,
    running_totals: BTreeMap<GroupKey, RunningTotal>,
    approvals: BTreeMap<(String, i32), Approval>,
    activity: Vec<Activity>,
    next_activity_id: i64,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self {
            settlements: Vec::new(),
            next_ref_id: 1,
            running_totals: BTreeMap::new(),
            approvals: BTreeMap::new(),
            activity: Vec::new(),
            next_activity_id: 1,
        }
    }

    // -- read accessors, for assertions in tests --------------------------

    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }

    pub fn running_total(&self, group: &GroupKey) -> Option<&RunningTotal> {
        self.running_totals.get(group)
    }

    pub fn approval(&self, business_id: &str, version: i32) -> Option<&Approval> {
        self.approvals.get(&(business_id.to_string(), version))
    }

    pub fn activity_log(&self) -> &[Activity] {
        &self.activity
    }

    pub fn fetch_latest_settlement(&self, business_id: &str) -> Option<&Settlement> {
        self.settlements
            .iter()
            .find(|s| s.business_id == business_id && !s.is_old)
    }

    pub fn fetch_settlement_by_version(&self, business_id: &str, version: i32) -> Option<&Settlement> {
        self.settlements
            .iter()
            .find(|s| s.business_id == business_id && s.version == version)
    }

    // -- IngestSettlement (§4.4, §6) ---------------------------------------

    /// Mirrors `plm_ingestion::ingest_settlement` minus the transient-storage
    /// retry loop, which has no counterpart without a real database.
    pub fn ingest_settlement(
        &mut self,
        s: &NewSettlement,
        currency_allowlist: &[String],
        rate_book: &RateBook,
        rule_book: &RuleBook,
    ) -> Result<IngestOutcome, PlmError> {
        validate_new_settlement(s, currency_allowlist)?;

        if let Some(existing) = self.find_exact(&s.business_id, &s.pts, &s.processing_entity, s.version) {
            return Ok(IngestOutcome {
                ref_id: existing.ref_id,
                duplicate: true,
            });
        }

        let ref_id = self.next_ref_id;
        self.next_ref_id += 1;
        let now = Utc::now();
        self.settlements.push(Settlement {
            ref_id,
            business_id: s.business_id.clone(),
            version: s.version,
            pts: s.pts.clone(),
            processing_entity: s.processing_entity.clone(),
            counterparty_id: s.counterparty_id.clone(),
            value_date: s.value_date,
            currency: s.currency.clone(),
            amount: s.amount,
            direction: s.direction,
            settlement_type: s.settlement_type,
            business_status: s.business_status,
            is_old: false,
            created_at: now,
            updated_at: now,
        });

        self.mark_old_versions(&s.business_id, &s.pts, &s.processing_entity);

        let prev = self.find_previous_counterparty(&s.business_id, &s.pts, &s.processing_entity, ref_id);
        let prev_version = self.find_previous_version(&s.business_id, &s.pts, &s.processing_entity, ref_id);
        let new_group = GroupKey::new(
            s.pts.clone(),
            s.processing_entity.clone(),
            s.counterparty_id.clone(),
            s.value_date,
        );
        let migrated = matches!(&prev, Some(old_cp) if old_cp != &s.counterparty_id);

        let mut groups = vec![new_group.clone()];
        if migrated {
            groups.push(GroupKey::new(
                s.pts.clone(),
                s.processing_entity.clone(),
                prev.clone().expect("migrated implies prev is Some"),
                s.value_date,
            ));
        }

        let directions = rule_book.directions();
        let statuses = rule_book.statuses();

        for group in &groups {
            self.recompute_group(group, ref_id, rate_book, &directions, &statuses, &s.business_id, s.version)?;
        }

        self.append_activity(
            "ingestion-pipeline",
            ActivityAction::Create,
            &s.business_id,
            s.version,
            None,
            Some(&new_group),
        );

        if migrated {
            let old_group = &groups[1];
            self.append_activity(
                "ingestion-pipeline",
                ActivityAction::GroupMigration,
                &s.business_id,
                s.version,
                Some(&format!(
                    "migrated from {} to {}",
                    old_group.counterparty_id, s.counterparty_id
                )),
                Some(&new_group),
            );
        }

        // Implicit reset (§4.6): any new version invalidates whatever approval
        // stood on the version it supersedes, even when the group didn't change.
        if let Some(prev_version) = prev_version {
            self.approvals.remove(&(s.business_id.clone(), prev_version));
            self.append_activity(
                "ingestion-pipeline",
                ActivityAction::StatusReset,
                &s.business_id,
                s.version,
                Some(&format!("approval on version {prev_version} superseded")),
                Some(&new_group),
            );
        }

        Ok(IngestOutcome {
            ref_id,
            duplicate: false,
        })
    }

    // -- QuerySettlement (§6) -----------------------------------------------

    pub fn query_settlement(&self, business_id: &str, limit_book: &plm_limits::LimitBook) -> Option<SettlementView> {
        let settlement = self.fetch_latest_settlement(business_id)?.clone();
        let group = settlement.group_key();
        let running_total = self.running_totals.get(&group).cloned();
        let approval = self.approval(business_id, settlement.version).cloned();
        let limit_usd = limit_book
            .limit_for(&settlement.counterparty_id)
            .unwrap_or(Decimal::ZERO);

        let derived_status = derive_status(&StatusInputs {
            settlement: &settlement,
            running_total: running_total.as_ref(),
            limit_usd,
            approval: approval.as_ref(),
        });
        let group_total_usd = running_total.as_ref().map(|rt| rt.total_usd).unwrap_or(Decimal::ZERO);

        Some(SettlementView {
            settlement,
            derived_status,
            group_total_usd,
            limit_usd,
            approval,
        })
    }

    // -- RequestRelease / Authorize (§4.6, §6) ------------------------------

    pub fn request_release(
        &mut self,
        business_id: &str,
        version: i32,
        requested_by: &str,
        comment: &str,
        limit_book: &plm_limits::LimitBook,
    ) -> Result<DerivedStatus, PlmError> {
        let settlement = self
            .fetch_settlement_by_version(business_id, version)
            .cloned()
            .ok_or_else(|| PlmError::Validation {
                business_id: business_id.to_string(),
                version,
                stage: "request_release/fetch_settlement",
                message: "no settlement exists for this (business_id, version)".to_string(),
            })?;
        let group = settlement.group_key();
        let running_total = self.running_totals.get(&group).cloned();
        let existing_approval = self.approval(business_id, version).cloned();
        let limit_usd = limit_book
            .limit_for(&settlement.counterparty_id)
            .unwrap_or(Decimal::ZERO);

        let is_blocked = derive_status(&StatusInputs {
            settlement: &settlement,
            running_total: running_total.as_ref(),
            limit_usd,
            approval: existing_approval.as_ref(),
        }) == DerivedStatus::Blocked;

        let write = ApprovalGateway::new()
            .request_release(&settlement, is_blocked, existing_approval.as_ref(), requested_by, comment, Utc::now())
            .map_err(|refusal| PlmError::ApprovalViolation {
                business_id: business_id.to_string(),
                version,
                reason: refusal.to_string(),
            })?;

        self.approvals.insert(
            (business_id.to_string(), version),
            Approval {
                business_id: business_id.to_string(),
                version,
                requested_by: Some(write.requested_by),
                requested_at: Some(write.requested_at),
                request_comment: Some(write.request_comment),
                authorized_by: None,
                authorized_at: None,
                authorize_comment: None,
            },
        );

        self.append_activity(requested_by, ActivityAction::RequestRelease, business_id, version, Some(comment), Some(&group));

        Ok(DerivedStatus::PendingAuthorise)
    }

    pub fn authorise(
        &mut self,
        business_id: &str,
        version: i32,
        authorized_by: &str,
        comment: &str,
    ) -> Result<DerivedStatus, PlmError> {
        let settlement = self
            .fetch_settlement_by_version(business_id, version)
            .cloned()
            .ok_or_else(|| PlmError::Validation {
                business_id: business_id.to_string(),
                version,
                stage: "authorise/fetch_settlement",
                message: "no settlement exists for this (business_id, version)".to_string(),
            })?;
        let group = settlement.group_key();
        let existing_approval = self.approval(business_id, version).cloned();

        let write = ApprovalGateway::new()
            .authorise(existing_approval.as_ref(), authorized_by, comment, Utc::now())
            .map_err(|refusal| PlmError::ApprovalViolation {
                business_id: business_id.to_string(),
                version,
                reason: refusal.to_string(),
            })?;

        let mut approval = existing_approval.expect("authorise gate guarantees an existing approval row");
        approval.authorized_by = Some(write.authorized_by);
        approval.authorized_at = Some(write.authorized_at);
        approval.authorize_comment = Some(write.authorize_comment);
        self.approvals.insert((business_id.to_string(), version), approval);

        self.append_activity(authorized_by, ActivityAction::Authorise, business_id, version, Some(comment), Some(&group));

        Ok(DerivedStatus::Authorised)
    }

    // -- RecalculateScope (§6) ----------------------------------------------

    pub fn recalculate_scope(
        &mut self,
        request: &RecalculateScopeRequest,
        user_id: &str,
        reason: &str,
        rate_book: &RateBook,
        rule_book: &RuleBook,
    ) -> Result<RecalculateOutcome, PlmError> {
        let narrowed: Vec<GroupKey> = self
            .running_totals
            .keys()
            .filter(|g| {
                request.pts.as_deref().map_or(true, |pts| g.pts == pts)
                    && request
                        .processing_entity
                        .as_deref()
                        .map_or(true, |entity| g.processing_entity == entity)
                    && request
                        .counterparty_id
                        .as_deref()
                        .map_or(true, |cp| g.counterparty_id == cp)
            })
            .cloned()
            .collect();
        let groups = filter_groups_in_scope(request, narrowed);

        let max_ref_id = self.current_max_ref_id();
        let directions = rule_book.directions();
        let statuses = rule_book.statuses();

        for group in &groups {
            self.recompute_group(group, max_ref_id, rate_book, &directions, &statuses, "RECALCULATE_SCOPE", 0)?;
        }

        self.append_activity(user_id, ActivityAction::RecalculateScope, "RECALCULATE_SCOPE", 0, Some(reason), None);

        Ok(RecalculateOutcome {
            groups_recomputed: groups.len(),
        })
    }

    // -- internal, mirrors plm-db storage functions -------------------------

    /// Mirrors `plm_db::current_max_ref_id`: the true current global maximum
    /// `ref_id`, not the max of the in-scope groups' own stored watermarks
    /// (which would just reproduce a stale total in exactly the scenario
    /// `RecalculateScope` exists to fix).
    fn current_max_ref_id(&self) -> i64 {
        self.settlements.iter().map(|s| s.ref_id).max().unwrap_or(0)
    }

    fn find_exact(&self, business_id: &str, pts: &str, processing_entity: &str, version: i32) -> Option<&Settlement> {
        self.settlements
            .iter()
            .find(|s| s.business_id == business_id && s.pts == pts && s.processing_entity == processing_entity && s.version == version)
    }

    fn mark_old_versions(&mut self, business_id: &str, pts: &str, processing_entity: &str) {
        let max_version = self
            .settlements
            .iter()
            .filter(|s| s.business_id == business_id && s.pts == pts && s.processing_entity == processing_entity)
            .map(|s| s.version)
            .max();
        let Some(max_version) = max_version else { return };

        for s in self.settlements.iter_mut() {
            if s.business_id == business_id
                && s.pts == pts
                && s.processing_entity == processing_entity
                && !s.is_old
                && s.version < max_version
            {
                s.is_old = true;
                s.updated_at = Utc::now();
            }
        }
    }

    fn find_previous_counterparty(
        &self,
        business_id: &str,
        pts: &str,
        processing_entity: &str,
        before_ref_id: i64,
    ) -> Option<String> {
        self.settlements
            .iter()
            .filter(|s| s.business_id == business_id && s.pts == pts && s.processing_entity == processing_entity && s.ref_id < before_ref_id)
            .max_by_key(|s| s.ref_id)
            .map(|s| s.counterparty_id.clone())
    }

    /// Mirrors `plm_db::find_previous_version`.
    fn find_previous_version(
        &self,
        business_id: &str,
        pts: &str,
        processing_entity: &str,
        before_ref_id: i64,
    ) -> Option<i32> {
        self.settlements
            .iter()
            .filter(|s| s.business_id == business_id && s.pts == pts && s.processing_entity == processing_entity && s.ref_id < before_ref_id)
            .max_by_key(|s| s.ref_id)
            .map(|s| s.version)
    }

    /// Mirrors `plm_db::scan_latest_eligible`'s `DISTINCT ON` selection: one
    /// row per `business_id` — the greatest `(version, ref_id)` as of
    /// `at_ref_id` — then filtered to the requested group and eligibility set.
    /// Does not read `is_old`, for the same reason the SQL version doesn't.
    fn scan_latest_eligible(
        &self,
        group: &GroupKey,
        at_ref_id: i64,
        eligible_directions: &[Direction],
        eligible_statuses: &[BusinessStatus],
    ) -> Vec<(String, Decimal)> {
        let mut latest: BTreeMap<(String, String, String), &Settlement> = BTreeMap::new();
        for s in &self.settlements {
            if s.pts != group.pts || s.processing_entity != group.processing_entity || s.ref_id > at_ref_id {
                continue;
            }
            let key = (s.business_id.clone(), s.pts.clone(), s.processing_entity.clone());
            match latest.get(&key) {
                None => {
                    latest.insert(key, s);
                }
                Some(cur) if (s.version, s.ref_id) > (cur.version, cur.ref_id) => {
                    latest.insert(key, s);
                }
                _ => {}
            }
        }

        latest
            .into_values()
            .filter(|s| s.counterparty_id == group.counterparty_id && s.value_date == group.value_date)
            .filter(|s| eligible_directions.contains(&s.direction) && eligible_statuses.contains(&s.business_status))
            .map(|s| (s.currency.clone(), s.amount))
            .collect()
    }

    fn recompute_group(
        &mut self,
        group: &GroupKey,
        at_ref_id: i64,
        rate_book: &RateBook,
        eligible_directions: &[Direction],
        eligible_statuses: &[BusinessStatus],
        business_id: &str,
        version: i32,
    ) -> Result<(), PlmError> {
        let rows = self.scan_latest_eligible(group, at_ref_id, eligible_directions, eligible_statuses);

        let mut total = Decimal::ZERO;
        let count = rows.len() as i32;
        for (currency, amount) in &rows {
            let Some(rate) = rate_book.rate_for(currency) else {
                return Err(PlmError::MissingRate {
                    business_id: business_id.to_string(),
                    version,
                    ref_id: Some(at_ref_id),
                    stage: "recompute_group",
                    currency: currency.clone(),
                });
            };
            total += *amount * rate;
        }
        let total = total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        self.upsert_running_total(group, total, count, at_ref_id);
        Ok(())
    }

    /// Mirrors `plm_db::upsert_running_total`'s watermark guard: a write from
    /// a `ref_id` older than the stored watermark is silently dropped.
    fn upsert_running_total(&mut self, group: &GroupKey, total_usd: Decimal, settlement_count: i32, ref_id: i64) {
        match self.running_totals.get(group) {
            Some(existing) if existing.ref_id_watermark > ref_id => return,
            _ => {}
        }
        self.running_totals.insert(
            group.clone(),
            RunningTotal {
                pts: group.pts.clone(),
                processing_entity: group.processing_entity.clone(),
                counterparty_id: group.counterparty_id.clone(),
                value_date: group.value_date,
                total_usd,
                ref_id_watermark: ref_id,
                settlement_count,
                updated_at: Utc::now(),
            },
        );
    }

    fn append_activity(
        &mut self,
        user_id: &str,
        action: ActivityAction,
        business_id: &str,
        version: i32,
        comment: Option<&str>,
        group_context: Option<&GroupKey>,
    ) -> Activity {
        let id = self.next_activity_id;
        self.next_activity_id += 1;
        let activity = Activity {
            id,
            user_id: user_id.to_string(),
            action,
            business_id: business_id.to_string(),
            version,
            comment: comment.map(str::to_string),
            group_context: group_context.cloned(),
            ts: Utc::now(),
        };
        self.activity.push(activity.clone());
        activity
    }
}
