//! Layered YAML configuration loading.
//!
//! Config inputs enumerated by the external-interfaces contract: `rule_refresh_interval`,
//! `rate_refresh_interval`, `limit_mode` (+ `flat_limit_usd`), `max_transaction_retries`,
//! `currency_allowlist`, plus the connection settings a deployable service needs
//! (`database_url`, `bind_addr`).
//!
//! Later layers override earlier ones via deep-merge (base file, then an optional
//! environment-specific overlay). The merged document is canonicalized (keys sorted
//! recursively) before being hashed, so the resulting `config_hash` is stable across
//! key reordering and can be logged at startup for change traceability.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitMode {
    Flat,
    PerCounterparty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlmConfig {
    pub database_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_rule_refresh_secs")]
    pub rule_refresh_interval_secs: u64,
    #[serde(default = "default_rate_refresh_secs")]
    pub rate_refresh_interval_secs: u64,
    pub limit_mode: LimitMode,
    #[serde(default)]
    pub flat_limit_usd: Option<Decimal>,
    #[serde(default = "default_max_retries")]
    pub max_transaction_retries: u32,
    pub currency_allowlist: Vec<String>,
    /// Bearer token elevated operator endpoints (`RecalculateScope`) require.
    /// `None` means the deployment has no elevated-privilege surface exposed
    /// over HTTP at all — the handler then refuses every request rather than
    /// defaulting to open.
    #[serde(default)]
    pub recalculate_scope_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_rule_refresh_secs() -> u64 {
    5 * 60
}

fn default_rate_refresh_secs() -> u64 {
    12 * 60 * 60
}

fn default_max_retries() -> u32 {
    3
}

impl PlmConfig {
    pub fn rule_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rule_refresh_interval_secs)
    }

    pub fn rate_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rate_refresh_interval_secs)
    }

    /// Validates the `limit_mode` / `flat_limit_usd` pairing the MVP requires.
    pub fn validate(&self) -> Result<()> {
        if self.limit_mode == LimitMode::Flat && self.flat_limit_usd.is_none() {
            anyhow::bail!("limit_mode=flat requires flat_limit_usd to be set");
        }
        if self.currency_allowlist.is_empty() {
            anyhow::bail!("currency_allowlist must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PlmConfig,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        sources.push(s);
    }
    load_layered_yaml_from_strings(&sources.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Same as [`load_layered_yaml`] but takes YAML content directly, for tests and
/// for callers that already hold config text (e.g. embedded defaults).
pub fn load_layered_yaml_from_strings(layers: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, layer) in layers.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(layer).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let config: PlmConfig =
        serde_json::from_str(&canonical).context("merged config does not match PlmConfig shape")?;
    config.validate()?;

    Ok(LoadedConfig {
        config,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
