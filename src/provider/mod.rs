//! Text-generation providers.
//!
//! Every backend implements [`Provider`]; the [`ProviderRegistry`] maps the
//! names used in calls and pricing keys to concrete implementations.

mod mock;

pub use mock::MockProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ExecutionConfig, ProviderConfig, ProviderKind};

/// Opaque key-value parameters forwarded to a provider and persisted with the request.
pub type CallParams = serde_json::Map<String, serde_json::Value>;

/// Output of a successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Failure raised while generating.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Generation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A text-generation backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate a completion for an already normalized prompt.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &CallParams,
    ) -> Result<Generation, ProviderError>;
}

/// Registered providers, keyed by the name callers pass to `execute`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured provider entries.
    pub fn from_config(providers: &[ProviderConfig], execution: &ExecutionConfig) -> Self {
        let mut registry = Self::new();
        for p in providers {
            let provider: Arc<dyn Provider> = match p.kind {
                ProviderKind::Mock => Arc::new(MockProvider::with_delay_unit(execution.mock_delay())),
            };
            tracing::debug!(provider = %p.name, kind = ?p.kind, "Registered provider");
            registry.register(p.name.clone(), provider);
        }
        registry
    }

    /// Register (or replace) a provider under `name`.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
