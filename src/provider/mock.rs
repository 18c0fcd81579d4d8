//! Deterministic offline provider for tests and demos.

use std::time::Duration;

use async_trait::async_trait;

use super::{CallParams, Generation, Provider, ProviderError};

/// Shortest mock response, in characters.
const MIN_OUTPUT_CHARS: f64 = 30.0;

/// Longest mock response, in characters.
const MAX_OUTPUT_CHARS: f64 = 1200.0;

/// Echoes the prompt back with a synthetic delay.
///
/// Models whose name contains `"small"` answer shorter and faster than the rest,
/// which gives latency-aware routing something to distinguish.
#[derive(Debug, Clone)]
pub struct MockProvider {
    delay_unit: Duration,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            delay_unit: Duration::from_millis(50),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total delay per call is `unit + unit * scale`.
    pub fn with_delay_unit(delay_unit: Duration) -> Self {
        Self { delay_unit }
    }

    fn scale(model: &str) -> f64 {
        if model.contains("small") {
            1.0
        } else {
            2.0
        }
    }

    /// Rough token estimate of ~4 characters per token, at least one.
    fn estimate_tokens(text: &str) -> u32 {
        ((text.chars().count() / 4) as u32).max(1)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _params: &CallParams,
    ) -> Result<Generation, ProviderError> {
        let scale = Self::scale(model);
        let tokens_in = Self::estimate_tokens(prompt);

        let prompt_chars = prompt.chars().count() as f64;
        let out_len = (prompt_chars * scale).clamp(MIN_OUTPUT_CHARS, MAX_OUTPUT_CHARS) as usize;
        let text: String = format!("Response: {}", prompt).chars().take(out_len).collect();
        let tokens_out = Self::estimate_tokens(&text);

        let delay = self.delay_unit + self.delay_unit.mul_f64(scale);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(Generation {
            text,
            tokens_in,
            tokens_out,
        })
    }
}
