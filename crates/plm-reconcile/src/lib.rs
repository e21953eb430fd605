//! plm-reconcile
//!
//! Recompute-side guards: the in-process `RunningTotal` watermark (§4.3) and
//! the `RecalculateScope` group-enumeration logic (§6). Deterministic, pure
//! logic — no IO, no database handle.

mod scope;
mod watermark;

pub use scope::{filter_groups_in_scope, RecalculateScopeRequest};
pub use watermark::{RunningTotalWatermark, WatermarkDecision};
