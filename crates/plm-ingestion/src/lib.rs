//! plm-ingestion
//!
//! The Ingestion Pipeline orchestrator (§4.4), its retry policy (§7), the
//! `PlmError` taxonomy (§7/§8.2), ingress validation, `QuerySettlement`,
//! `RequestRelease`/`Authorize` (§4.6), and `RecalculateScope` (§6).

pub mod approval;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod recalculate;
pub mod retry;
pub mod validation;

pub use approval::{authorise, authorise_bulk, request_release, request_release_bulk};
pub use error::{is_transient_storage_error, PlmError};
pub use recalculate::{recalculate_scope, RecalculateOutcome};
pub use retry::ingest_settlement;
pub use query::query_settlement;
