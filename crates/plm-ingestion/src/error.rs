//! `PlmError` (§7): the one caller-visible error taxonomy boundary type. Every
//! other fallible call in this crate propagates with `anyhow::Result`/`?`;
//! this enum exists only where the propagation policy requires a distinct,
//! inspectable reason code.

use thiserror::Error;

/// One variant per §7 taxonomy entry, each carrying the fields the
/// propagation policy requires for logging (`business_id`, `version`,
/// `ref_id` once assigned, and the failing stage).
#[derive(Debug, Error)]
pub enum PlmError {
    #[error("validation failed for {business_id} v{version} at {stage}: {message}")]
    Validation {
        business_id: String,
        version: i32,
        stage: &'static str,
        message: String,
    },

    /// Not actually an error condition for the caller — `IngestSettlement`
    /// returns the prior `ref_id` instead of failing — but the pipeline needs
    /// a way to report it to logging/activity without a second return path.
    #[error("duplicate settlement {business_id} v{version}, existing ref_id {ref_id}")]
    Duplicate {
        business_id: String,
        version: i32,
        ref_id: i64,
    },

    #[error("missing exchange rate for currency {currency} ({business_id} v{version}, ref_id {ref_id:?}, stage {stage})")]
    MissingRate {
        business_id: String,
        version: i32,
        ref_id: Option<i64>,
        stage: &'static str,
        currency: String,
    },

    #[error("transient storage failure for {business_id} v{version} (ref_id {ref_id:?}, stage {stage}): {source}")]
    TransientStorage {
        business_id: String,
        version: i32,
        ref_id: Option<i64>,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("approval violation for {business_id} v{version}: {reason}")]
    ApprovalViolation {
        business_id: String,
        version: i32,
        reason: String,
    },

    #[error("fatal error at {stage}: {source}")]
    Fatal {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl PlmError {
    pub fn business_id(&self) -> Option<&str> {
        match self {
            PlmError::Validation { business_id, .. }
            | PlmError::Duplicate { business_id, .. }
            | PlmError::MissingRate { business_id, .. }
            | PlmError::TransientStorage { business_id, .. }
            | PlmError::ApprovalViolation { business_id, .. } => Some(business_id),
            PlmError::Fatal { .. } => None,
        }
    }

    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PlmError::Validation { stage, .. }
            | PlmError::MissingRate { stage, .. }
            | PlmError::TransientStorage { stage, .. }
            | PlmError::Fatal { stage, .. } => Some(stage),
            PlmError::Duplicate { .. } | PlmError::ApprovalViolation { .. } => None,
        }
    }

    /// Whether `§7`'s propagation policy calls for retrying this error class
    /// locally rather than surfacing it to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlmError::TransientStorage { .. })
    }
}

/// Best-effort classification of a raw `sqlx::Error` into the transient-storage
/// bucket (serialization failure / deadlock) versus everything else, which is
/// treated as fatal. Postgres reports both conditions via SQLSTATE class 40
/// (`40001` serialization_failure, `40P01` deadlock_detected).
pub fn is_transient_storage_error(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_storage_is_retryable_and_others_are_not() {
        let transient = PlmError::TransientStorage {
            business_id: "S1".into(),
            version: 1,
            ref_id: Some(10),
            stage: "upsert",
            source: anyhow::anyhow!("serialization failure"),
        };
        assert!(transient.is_retryable());

        let validation = PlmError::Validation {
            business_id: "S1".into(),
            version: 1,
            stage: "validate",
            message: "bad currency".into(),
        };
        assert!(!validation.is_retryable());
    }
}
