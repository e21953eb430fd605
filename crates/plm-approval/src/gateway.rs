//! ApprovalGateway — the single choke-point through which REQUEST_RELEASE and
//! AUTHORISE must flow (§4.6 Rust realization): the state machine checks in
//! `state_machine` are never meant to be called directly by a handler — they
//! are wrapped here so every caller pays the same gate checks, in the same
//! order, with no way around them.
//!
//! This gateway owns no I/O: it returns the exact write the caller must
//! persist, so `plm-ingestion` (which does hold the database transaction)
//! performs the actual mutation.

use chrono::{DateTime, Utc};

use plm_schemas::{Approval, Settlement};

use crate::state_machine::{
    check_authorise, check_request_release, ApprovalRefusal, AuthoriseWrite, RequestReleaseWrite,
};

#[derive(Debug, Default)]
pub struct ApprovalGateway;

impl ApprovalGateway {
    pub fn new() -> Self {
        Self
    }

    pub fn request_release(
        &self,
        settlement: &Settlement,
        is_blocked: bool,
        existing_approval: Option<&Approval>,
        requested_by: &str,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestReleaseWrite, ApprovalRefusal> {
        check_request_release(settlement, is_blocked, existing_approval, requested_by, comment, now)
    }

    pub fn authorise(
        &self,
        existing_approval: Option<&Approval>,
        authorized_by: &str,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthoriseWrite, ApprovalRefusal> {
        check_authorise(existing_approval, authorized_by, comment, now)
    }

    /// Bulk REQUEST_RELEASE (§4.6): all-or-nothing across a set of
    /// `business_id`s that share one group. The caller supplies each
    /// settlement + its existing approval row; every one must pass the gate
    /// or none are written.
    pub fn request_release_bulk<'a>(
        &self,
        items: &[(&'a Settlement, bool, Option<&'a Approval>)],
        requested_by: &str,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestReleaseWrite>, ApprovalRefusal> {
        items
            .iter()
            .map(|(settlement, is_blocked, existing)| {
                check_request_release(settlement, *is_blocked, *existing, requested_by, comment, now)
            })
            .collect()
    }

    /// Bulk AUTHORISE (§4.6), same all-or-nothing contract.
    pub fn authorise_bulk<'a>(
        &self,
        items: &[Option<&'a Approval>],
        authorized_by: &str,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthoriseWrite>, ApprovalRefusal> {
        items
            .iter()
            .map(|existing| check_authorise(*existing, authorized_by, comment, now))
            .collect()
    }
}
