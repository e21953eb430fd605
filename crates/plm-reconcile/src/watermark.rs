//! RunningTotal watermark guard — §4.3.
//!
//! Same accept/reject-without-mutation shape as a snapshot monotonicity
//! check, retargeted from a wall-clock `fetched_at_ms` to the store's
//! `ref_id` sequence. `plm-db::upsert_running_total`
//! enforces the authoritative version of this guard at the SQL level (the
//! watermark column's `<=` check in the `ON CONFLICT ... WHERE` clause); this
//! pure type lets the ingestion pipeline reject a stale recompute in-process,
//! before it ever reaches the database, and lets `plm-testkit` exercise the
//! guard's semantics without a live Postgres instance.
//!
//! Invariants:
//! - **Non-decreasing**: a candidate `ref_id` is accepted only if it is ≥ the
//!   last accepted `ref_id`.
//! - **Watermark advances only on acceptance**: rejections do not move it.
//! - **Pure, no IO.**

/// Result of checking a candidate `ref_id` against a `RunningTotalWatermark`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatermarkDecision {
    /// `ref_id` is ≥ the watermark — the recompute may proceed.
    Accept,
    /// `ref_id` is strictly older than the last accepted value.
    Stale { watermark: i64, got: i64 },
}

impl WatermarkDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, WatermarkDecision::Accept)
    }

    pub fn is_stale(&self) -> bool {
        !self.is_accepted()
    }
}

/// Tracks the last-accepted `ref_id` for one group's running total.
#[derive(Clone, Copy, Debug)]
pub struct RunningTotalWatermark {
    last_accepted_ref_id: i64,
}

impl Default for RunningTotalWatermark {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningTotalWatermark {
    /// Starts at `i64::MIN` so the first recompute for a group is always accepted.
    pub fn new() -> Self {
        Self {
            last_accepted_ref_id: i64::MIN,
        }
    }

    pub fn at(last_accepted_ref_id: i64) -> Self {
        Self {
            last_accepted_ref_id,
        }
    }

    /// Read-only freshness probe; does not mutate `self`.
    pub fn check(&self, ref_id: i64) -> WatermarkDecision {
        if ref_id < self.last_accepted_ref_id {
            WatermarkDecision::Stale {
                watermark: self.last_accepted_ref_id,
                got: ref_id,
            }
        } else {
            WatermarkDecision::Accept
        }
    }

    /// Checks and, if accepted, advances the watermark to `ref_id`.
    pub fn accept(&mut self, ref_id: i64) -> WatermarkDecision {
        let decision = self.check(ref_id);
        if decision.is_accepted() {
            self.last_accepted_ref_id = ref_id;
        }
        decision
    }

    pub fn last_accepted_ref_id(&self) -> i64 {
        self.last_accepted_ref_id
    }

    pub fn has_accepted_any(&self) -> bool {
        self.last_accepted_ref_id > i64::MIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_recompute_is_always_accepted() {
        let mut wm = RunningTotalWatermark::new();
        assert_eq!(wm.accept(1), WatermarkDecision::Accept);
        assert_eq!(wm.last_accepted_ref_id(), 1);
    }

    #[test]
    fn equal_ref_id_is_accepted_not_stale() {
        let mut wm = RunningTotalWatermark::at(5);
        assert_eq!(wm.accept(5), WatermarkDecision::Accept);
    }

    #[test]
    fn lower_ref_id_is_rejected_and_watermark_unchanged() {
        let mut wm = RunningTotalWatermark::at(10);
        let decision = wm.accept(4);
        assert_eq!(
            decision,
            WatermarkDecision::Stale {
                watermark: 10,
                got: 4
            }
        );
        assert_eq!(wm.last_accepted_ref_id(), 10);
    }

    #[test]
    fn check_does_not_mutate() {
        let wm = RunningTotalWatermark::at(10);
        let _ = wm.check(4);
        assert_eq!(wm.last_accepted_ref_id(), 10);
    }
}
