//! Ingress validation (§7 Validation class): checked before the transaction
//! opens, so a bad request never consumes a `ref_id`.

use plm_schemas::NewSettlement;

use crate::error::PlmError;

pub fn validate_new_settlement(
    s: &NewSettlement,
    currency_allowlist: &[String],
) -> Result<(), PlmError> {
    let fail = |stage: &'static str, message: String| PlmError::Validation {
        business_id: s.business_id.clone(),
        version: s.version,
        stage,
        message,
    };

    if s.business_id.trim().is_empty() {
        return Err(fail("validate", "business_id must not be empty".into()));
    }
    if s.version <= 0 {
        return Err(fail(
            "validate",
            format!("version must be positive, got {}", s.version),
        ));
    }
    if s.pts.trim().is_empty() {
        return Err(fail("validate", "pts must not be empty".into()));
    }
    if s.processing_entity.trim().is_empty() {
        return Err(fail(
            "validate",
            "processing_entity must not be empty".into(),
        ));
    }
    if s.counterparty_id.trim().is_empty() {
        return Err(fail("validate", "counterparty_id must not be empty".into()));
    }
    if s.currency.len() != 3 {
        return Err(fail(
            "validate",
            format!("currency must be an ISO 4217 code, got {:?}", s.currency),
        ));
    }
    if !currency_allowlist.iter().any(|c| c == &s.currency) {
        return Err(fail(
            "validate",
            format!("currency {} is not in the allowlist", s.currency),
        ));
    }
    if s.amount <= rust_decimal::Decimal::ZERO {
        return Err(fail(
            "validate",
            format!("amount must be positive, got {}", s.amount),
        ));
    }

    Ok(())
}
