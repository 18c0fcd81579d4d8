//! Unified call wrapper.
//!
//! [`UnifiedLlm::execute`] runs one generation against a registered provider,
//! measures it, prices it, scores it, and records it in the metrics store.
//! Provider failures, panics and timeouts become `error`-status results; only an
//! unknown provider or a store failure surfaces as an `Err`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pricing::{pricing_key, PricingTable};
use crate::provider::{CallParams, Generation, ProviderError, ProviderRegistry};
use crate::storage::{persist_call, CallStatus, RequestRecord, ResponseRecord};
use crate::text;

/// Everything known about one executed call.
#[derive(Debug, Clone, Serialize)]
pub struct CallResult {
    pub request_id: String,
    pub provider: String,
    pub model: String,
    /// Normalized prompt actually sent to the provider
    pub prompt: String,
    pub prompt_hash: String,
    pub response_text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency_ms: f64,
    pub cost_usd: f64,
    pub quality_proxy: f64,
    pub status: CallStatus,
    pub error_msg: Option<String>,
}

impl CallResult {
    pub fn is_ok(&self) -> bool {
        self.status == CallStatus::Ok
    }
}

/// Executes calls through registered providers and records their metrics.
#[derive(Debug, Clone)]
pub struct UnifiedLlm {
    providers: ProviderRegistry,
    pricing: Arc<PricingTable>,
    pool: SqlitePool,
    timeout: Duration,
}

impl UnifiedLlm {
    pub fn new(
        providers: ProviderRegistry,
        pricing: Arc<PricingTable>,
        pool: SqlitePool,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            pricing,
            pool,
            timeout,
        }
    }

    /// Build a wrapper from configuration: providers, pricing and timeout.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let pricing = Arc::new(config.pricing_table()?);
        let providers = ProviderRegistry::from_config(&config.providers, &config.execution);
        tracing::debug!(
            providers = ?providers.names(),
            priced_models = pricing.len(),
            "Call wrapper configured"
        );
        Ok(Self::new(
            providers,
            pricing,
            pool,
            config.execution.timeout(),
        ))
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Execute one generation call and persist its outcome.
    ///
    /// Fails with [`Error::UnknownProvider`] before any side effect when
    /// `provider` is not registered, and with a persistence error when the
    /// request/response rows cannot be committed together.
    pub async fn execute(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        params: CallParams,
    ) -> Result<CallResult> {
        let backend = self
            .providers
            .get(provider)
            .ok_or_else(|| Error::UnknownProvider {
                provider: provider.to_string(),
            })?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let prompt = text::normalize(prompt);
        let prompt_hash = text::sha256_hex(&prompt);

        tracing::debug!(
            request_id = %request_id,
            provider = %provider,
            backend = %backend.name(),
            model = %model,
            prompt_len = prompt.chars().count(),
            "Executing call"
        );

        let started = Instant::now();
        let generation = AssertUnwindSafe(backend.generate(model, &prompt, &params)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, generation).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ProviderError::Failed(format!(
                "provider panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (status, generation, error_msg) = match outcome {
            Ok(generation) => (CallStatus::Ok, generation, None),
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    provider = %provider,
                    model = %model,
                    error = %e,
                    "Provider call failed"
                );
                let empty = Generation {
                    text: String::new(),
                    tokens_in: 0,
                    tokens_out: 0,
                };
                (CallStatus::Error, empty, Some(e.to_string()))
            }
        };

        let cost_usd = self.pricing.compute_cost(
            &pricing_key(provider, model),
            generation.tokens_in,
            generation.tokens_out,
        );
        let quality_proxy = match status {
            CallStatus::Ok => text::quality_proxy(&generation.text),
            CallStatus::Error => 0.0,
        };

        let request = RequestRecord {
            request_id: request_id.clone(),
            ts,
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_hash: prompt_hash.clone(),
            prompt_len: prompt.chars().count() as u32,
            params,
            latency_ms,
            status,
            error_msg: error_msg.clone(),
        };
        let response = (status == CallStatus::Ok).then(|| ResponseRecord {
            request_id: request_id.clone(),
            response_text: generation.text.clone(),
            tokens_in: generation.tokens_in,
            tokens_out: generation.tokens_out,
            cost_usd,
            quality_proxy,
        });

        if let Err(e) = persist_call(&self.pool, &request, response.as_ref()).await {
            tracing::error!(
                request_id = %request_id,
                error = %e,
                "Failed to record call in metrics store"
            );
            return Err(e);
        }

        tracing::info!(
            request_id = %request_id,
            provider = %provider,
            model = %model,
            status = %status,
            latency_ms = latency_ms,
            tokens_in = generation.tokens_in,
            tokens_out = generation.tokens_out,
            cost_usd = cost_usd,
            quality = quality_proxy,
            "Call recorded"
        );

        Ok(CallResult {
            request_id,
            provider: provider.to_string(),
            model: model.to_string(),
            prompt,
            prompt_hash,
            response_text: generation.text,
            tokens_in: generation.tokens_in,
            tokens_out: generation.tokens_out,
            latency_ms,
            cost_usd,
            quality_proxy,
            status,
            error_msg,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
