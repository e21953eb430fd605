//! plm-testkit
//!
//! Test-only support for property-based and scenario tests over the
//! ingestion/approval/recalculate-scope behavior (§8.4, §9), built around an
//! in-memory `FixtureStore` so those tests run without a live Postgres
//! instance.

mod fixture_store;

pub use fixture_store::FixtureStore;
