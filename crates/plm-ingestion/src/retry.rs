//! `ingest_settlement`: validates, then owns the retry/backoff loop and the
//! transaction boundary around `pipeline::run_ingestion_tx` (§4.4, §7).
//!
//! Retry policy is bounded-exponential backoff over the transient-storage
//! error class only — a serialization failure or deadlock is safe to retry
//! because the pipeline is pure given `ref_id`; anything else is fatal.

use std::time::Duration;

use sqlx::PgPool;
use tracing::warn;

use plm_config::PlmConfig;
use plm_limits::{RateBook, RuleBook};
use plm_schemas::{IngestOutcome, NewSettlement};

use crate::error::{is_transient_storage_error, PlmError};
use crate::pipeline::run_ingestion_tx;
use crate::validation::validate_new_settlement;

fn classify_sqlx_error(
    business_id: &str,
    version: i32,
    ref_id: Option<i64>,
    stage: &'static str,
    err: sqlx::Error,
) -> PlmError {
    if is_transient_storage_error(&err) {
        PlmError::TransientStorage {
            business_id: business_id.to_string(),
            version,
            ref_id,
            stage,
            source: anyhow::Error::new(err),
        }
    } else {
        PlmError::Fatal {
            stage,
            source: anyhow::Error::new(err),
        }
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(20);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// `IngestSettlement` (§6): validate, then run the pipeline body inside a
/// transaction, retrying up to `config.max_transaction_retries` times on a
/// transient-storage failure with bounded exponential backoff. Validation and
/// missing-rate/approval-violation failures are surfaced immediately, per §7's
/// propagation policy.
pub async fn ingest_settlement(
    pool: &PgPool,
    s: &NewSettlement,
    config: &PlmConfig,
    rate_book: &RateBook,
    rule_book: &RuleBook,
) -> Result<IngestOutcome, PlmError> {
    validate_new_settlement(s, &config.currency_allowlist)?;

    let directions = rule_book.directions();
    let statuses = rule_book.statuses();

    let mut attempt = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let outcome = run_attempt(pool, s, rate_book, &directions, &statuses).await;

        let err = match outcome {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= config.max_transaction_retries {
            return Err(err);
        }

        attempt += 1;
        warn!(
            business_id = %s.business_id,
            version = s.version,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "retrying ingestion after transient storage error"
        );
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// One begin/run/commit-or-rollback attempt.
async fn run_attempt(
    pool: &PgPool,
    s: &NewSettlement,
    rate_book: &RateBook,
    directions: &[plm_schemas::Direction],
    statuses: &[plm_schemas::BusinessStatus],
) -> Result<IngestOutcome, PlmError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| classify_sqlx_error(&s.business_id, s.version, None, "begin_transaction", e))?;

    let outcome = run_ingestion_tx(&mut tx, s, rate_book, directions, statuses).await?;

    tx.commit().await.map_err(|e| {
        classify_sqlx_error(
            &s.business_id,
            s.version,
            Some(outcome.ref_id),
            "commit",
            e,
        )
    })?;

    Ok(outcome)
}
