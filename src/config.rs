//! Configuration parsing and validation for llmopt.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::pricing::{PricingEntry, PricingTable};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    /// Inline pricing entries keyed by `provider:model`.
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingEntry>,
    /// Optional JSON pricing file, merged over the inline entries.
    pub pricing_file: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            routing: RoutingConfig::default(),
            execution: ExecutionConfig::default(),
            providers: default_providers(),
            pricing: BTreeMap::new(),
            pricing_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file. May contain `${VAR}` references.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./llmopt.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Routing policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Mean latency (ms) below which the quality recommendation is preferred.
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_ms: f64,
}

fn default_latency_threshold() -> f64 {
    150.0
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ms: default_latency_threshold(),
        }
    }
}

/// Call execution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on a single generation call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Base delay unit of the mock provider.
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_mock_delay_ms() -> u64 {
    50
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }
}

/// Which provider implementation backs a registered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mock,
}

/// Provider registration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Registry key, also the `provider` half of pricing keys
    pub name: String,
    pub kind: ProviderKind,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "mock".to_string(),
        kind: ProviderKind::Mock,
    }]
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` references
    /// from the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration using a custom environment lookup.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.database.path = expand_env_vars_with(&config.database.path, "database.path", &lookup)?;
        if let Some(file) = config.pricing_file.take() {
            config.pricing_file = Some(expand_env_vars_with(&file, "pricing_file", &lookup)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            tracing::warn!("No providers configured - every call will be rejected");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Provider with empty name".to_string(),
                ));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' registered more than once",
                    provider.name
                )));
            }
        }

        validate_latency_threshold(self.routing.latency_threshold_ms)?;

        if self.execution.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "execution.timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.database.path.is_empty() {
            return Err(ConfigError::Validation(
                "database.path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the pricing table: inline entries first, then the pricing file on top.
    pub fn pricing_table(&self) -> Result<PricingTable, ConfigError> {
        let mut table = PricingTable::from_entries(
            self.pricing
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone())),
        )?;

        if let Some(path) = &self.pricing_file {
            let from_file = PricingTable::from_json_file(path)?;
            tracing::debug!(path = %path, entries = from_file.len(), "Loaded pricing file");
            table.merge(from_file);
        }

        Ok(table)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${HOME}/${NAME}.db`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Check a routing latency threshold: finite and non-negative.
pub fn validate_latency_threshold(threshold: f64) -> Result<f64, ConfigError> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ConfigError::Validation(format!(
            "routing.latency_threshold_ms must be a non-negative number, got {}",
            threshold
        )));
    }
    Ok(threshold)
}
