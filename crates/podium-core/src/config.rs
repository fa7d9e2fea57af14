//! Runtime configuration for the scoring core.
//!
//! Defaults are compiled in; a JSON file and `PODIUM_*` environment
//! variables can override them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Nil UUID: written by clients that fell back to a zeroed id.
pub const NIL_EVENT_ID: &str = "00000000-0000-0000-0000-000000000000";
/// Max UUID: written by an old import path as a placeholder.
pub const MAX_EVENT_ID: &str = "ffffffff-ffff-ffff-ffff-ffffffffffff";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Soft reads (first lookup, standings).
    pub read_retry: RetryPolicy,
    /// Hard re-reads after losing an insert race.
    pub write_retry: RetryPolicy,
    /// Event ids that are well-formed but known to be corrupt.
    pub denied_event_ids: Vec<String>,
    /// Use the store's atomic upsert when it offers one.
    pub prefer_atomic_upsert: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            read_retry: RetryPolicy::read_default(),
            write_retry: RetryPolicy::write_default(),
            denied_event_ids: vec![NIL_EVENT_ID.to_string(), MAX_EVENT_ID.to_string()],
            prefer_atomic_upsert: true,
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `PODIUM_*` overrides looked up through `lookup`.
    ///
    /// - `PODIUM_RETRY_READ_ATTEMPTS`, `PODIUM_RETRY_READ_DELAY_MS`
    /// - `PODIUM_RETRY_WRITE_ATTEMPTS`, `PODIUM_RETRY_WRITE_DELAY_MS`
    /// - `PODIUM_RETRY_BACKOFF` (both policies)
    /// - `PODIUM_DENIED_EVENT_IDS` (comma-separated, replaces the list)
    /// - `PODIUM_ATOMIC_UPSERT` (`true`/`false`)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "PODIUM_RETRY_READ_ATTEMPTS")? {
            self.read_retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "PODIUM_RETRY_READ_DELAY_MS")? {
            self.read_retry.initial_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PODIUM_RETRY_WRITE_ATTEMPTS")? {
            self.write_retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "PODIUM_RETRY_WRITE_DELAY_MS")? {
            self.write_retry.initial_delay_ms = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "PODIUM_RETRY_BACKOFF")? {
            if !v.is_finite() || v < 1.0 {
                return Err(ConfigError::Invalid {
                    var: "PODIUM_RETRY_BACKOFF",
                    value: v.to_string(),
                });
            }
            self.read_retry.backoff_multiplier = v;
            self.write_retry.backoff_multiplier = v;
        }
        if let Some(list) = lookup("PODIUM_DENIED_EVENT_IDS") {
            self.denied_event_ids = list
                .split(',')
                .map(|id| id.trim().to_ascii_lowercase())
                .filter(|id| !id.is_empty())
                .collect();
        }
        if let Some(v) = parse_var(&lookup, "PODIUM_ATOMIC_UPSERT")? {
            self.prefer_atomic_upsert = v;
        }
        Ok(self)
    }

    pub fn is_denied(&self, event_id: &str) -> bool {
        self.denied_event_ids
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(event_id))
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
