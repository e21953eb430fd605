//! Command handler functions for plm-cli.
//!
//! Each subcommand of `plm` gets one function here; the confirmation-gated
//! destructive operation (`recalc` against a non-empty scope) requires an
//! explicit `--yes` before it touches anything.

use anyhow::{bail, Result};
use chrono::NaiveDate;

use plm_reconcile::{filter_groups_in_scope, RecalculateScopeRequest};

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

pub async fn migrate() -> Result<()> {
    let pool = plm_db::connect_from_env().await?;
    plm_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}

// ---------------------------------------------------------------------------
// config-hash
// ---------------------------------------------------------------------------

pub fn config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = plm_config::load_layered_yaml(&path_refs)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

// ---------------------------------------------------------------------------
// recalc
// ---------------------------------------------------------------------------

pub struct RecalcArgs {
    pub pts: Option<String>,
    pub processing_entity: Option<String>,
    pub counterparty_id: Option<String>,
    pub value_date_from: NaiveDate,
    pub value_date_to: NaiveDate,
    pub user_id: String,
    pub reason: String,
    pub yes: bool,
}

/// Runs `RecalculateScope` (§6) for the given scope. Before touching anything,
/// previews how many groups the scope actually matches; if that count is
/// non-zero, refuses without `--yes`.
pub async fn recalc(args: RecalcArgs) -> Result<()> {
    let pool = plm_db::connect_from_env().await?;

    let request = RecalculateScopeRequest {
        pts: args.pts.clone(),
        processing_entity: args.processing_entity.clone(),
        counterparty_id: args.counterparty_id.clone(),
        value_date_from: args.value_date_from,
        value_date_to: args.value_date_to,
    };

    let candidates = plm_db::list_running_totals_in_scope(
        &pool,
        args.pts.as_deref(),
        args.processing_entity.as_deref(),
        args.counterparty_id.as_deref(),
    )
    .await?;
    let groups = filter_groups_in_scope(&request, candidates.iter().map(|rt| rt.group_key()));

    if !groups.is_empty() && !args.yes {
        bail!(
            "REFUSING RECALC: scope matches {} group(s); pass --yes to confirm",
            groups.len()
        );
    }

    let rate_book = plm_limits::RateBook::from_rows(&plm_db::list_exchange_rates(&pool).await?);
    let rule_book = {
        let rules = plm_db::fetch_filtering_rules(&pool).await?;
        if rules.is_empty() {
            plm_limits::RuleBook::canonical_default()
        } else {
            plm_limits::RuleBook::new(rules)
        }
    };

    let outcome = plm_ingestion::recalculate_scope(
        &pool,
        &request,
        &args.user_id,
        &args.reason,
        &rate_book,
        &rule_book,
    )
    .await?;

    println!("groups_recomputed={}", outcome.groups_recomputed);
    Ok(())
}
