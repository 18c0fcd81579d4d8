//! Static per-model pricing and request cost computation.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::text::round_to;

/// Rates for a single `provider:model` pair, in currency units per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    #[serde(default, skip_serializing)]
    pub model: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl PricingEntry {
    pub fn new(model: impl Into<String>, input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            model: model.into(),
            input_per_million,
            output_per_million,
        }
    }
}

/// Read-only pricing table keyed by `provider:model`.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    entries: HashMap<String, PricingEntry>,
}

impl PricingTable {
    /// Build a table from `(key, entry)` pairs, rejecting negative or non-finite rates.
    pub fn from_entries<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, PricingEntry)>,
    {
        let mut table = HashMap::new();
        for (key, mut entry) in entries {
            for (label, rate) in [
                ("input_per_million", entry.input_per_million),
                ("output_per_million", entry.output_per_million),
            ] {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(ConfigError::Validation(format!(
                        "Pricing entry '{}' has invalid {}: {}",
                        key, label, rate
                    )));
                }
            }
            if entry.model.is_empty() {
                entry.model = key.clone();
            }
            table.insert(key, entry);
        }
        Ok(Self { entries: table })
    }

    /// Parse a JSON pricing file of the form
    /// `{ "provider:model": { "input_per_million": 0.5, "output_per_million": 1.5 } }`.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, PricingEntry> = serde_json::from_str(content).map_err(|e| {
            ConfigError::Validation(format!("Failed to parse pricing JSON: {}", e))
        })?;
        Self::from_entries(raw)
    }

    /// Load a JSON pricing file from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Merge `other` into this table; entries in `other` win on key collisions.
    pub fn merge(&mut self, other: PricingTable) {
        self.entries.extend(other.entries);
    }

    /// Look up the entry for an exact `provider:model` key.
    pub fn get(&self, key: &str) -> Option<&PricingEntry> {
        self.entries.get(key)
    }

    /// All entries sorted by key.
    pub fn entries(&self) -> Vec<(&str, &PricingEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cost of a call, rounded to 6 decimal places.
    ///
    /// Unpriced keys cost 0.0.
    pub fn compute_cost(&self, key: &str, tokens_in: u32, tokens_out: u32) -> f64 {
        let Some(entry) = self.entries.get(key) else {
            tracing::debug!(key = %key, "No pricing entry, treating cost as zero");
            return 0.0;
        };

        let cost_in = (tokens_in as f64 / 1_000_000.0) * entry.input_per_million;
        let cost_out = (tokens_out as f64 / 1_000_000.0) * entry.output_per_million;
        round_to(cost_in + cost_out, 6)
    }
}

/// Build the `provider:model` key used by the pricing table.
pub fn pricing_key(provider: &str, model: &str) -> String {
    format!("{}:{}", provider, model)
}
