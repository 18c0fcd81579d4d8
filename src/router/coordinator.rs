//! Coordinator: runs the analyzers and applies the routing policy.
//!
//! The policy is a two-branch rule, not a weighted score. When the fastest
//! model's mean latency is strictly below the threshold, latency is not the
//! bottleneck and the quality recommendation wins; otherwise the cost
//! recommendation wins.

use serde::Serialize;
use sqlx::SqlitePool;

use super::analyzer::{AgentMessage, Analyzer, CostAnalyzer, LatencyAnalyzer, QualityAnalyzer};
use crate::error::Result;

/// Which recommendation the policy followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteBasis {
    Quality,
    Cost,
}

/// The three analyzer messages, addressed by metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMessages {
    pub cost: AgentMessage,
    pub latency: AgentMessage,
    pub quality: AgentMessage,
}

impl AgentMessages {
    /// Messages in fixed cost, latency, quality order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentMessage> {
        [&self.cost, &self.latency, &self.quality].into_iter()
    }
}

/// Outcome of one coordinator run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub chosen_model: String,
    pub basis: RouteBasis,
    pub latency_threshold_ms: f64,
    pub messages: AgentMessages,
}

/// Apply the routing policy to a set of analyzer messages.
///
/// Uses strict less-than: a best latency equal to the threshold routes by cost.
pub fn route(messages: &AgentMessages, latency_threshold_ms: f64) -> (&str, RouteBasis) {
    if messages.latency.value < latency_threshold_ms {
        (messages.quality.recommendation.as_str(), RouteBasis::Quality)
    } else {
        (messages.cost.recommendation.as_str(), RouteBasis::Cost)
    }
}

/// Runs cost, latency and quality analyzers over the metrics store.
#[derive(Debug, Clone)]
pub struct Coordinator {
    pool: SqlitePool,
    cost: CostAnalyzer,
    latency: LatencyAnalyzer,
    quality: QualityAnalyzer,
}

impl Coordinator {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cost: CostAnalyzer,
            latency: LatencyAnalyzer,
            quality: QualityAnalyzer,
        }
    }

    /// Run every analyzer and choose a model.
    ///
    /// Any analyzer failure, including an empty history, aborts the decision.
    pub async fn decide(&self, latency_threshold_ms: f64) -> Result<Decision> {
        let messages = AgentMessages {
            cost: self.run(&self.cost).await?,
            latency: self.run(&self.latency).await?,
            quality: self.run(&self.quality).await?,
        };

        let (chosen, basis) = route(&messages, latency_threshold_ms);
        let chosen_model = chosen.to_string();

        tracing::info!(
            chosen_model = %chosen_model,
            basis = ?basis,
            best_latency_ms = messages.latency.value,
            latency_threshold_ms = latency_threshold_ms,
            "Routing decision"
        );

        Ok(Decision {
            chosen_model,
            basis,
            latency_threshold_ms,
            messages,
        })
    }

    async fn run(&self, analyzer: &dyn Analyzer) -> Result<AgentMessage> {
        let table = analyzer.analyze(&self.pool).await?;
        let message = analyzer.message(&table)?;
        tracing::debug!(
            agent = analyzer.name(),
            metric = %message.metric,
            models = table.len(),
            recommendation = %message.recommendation,
            value = message.value,
            "Analyzer finished"
        );
        Ok(message)
    }
}
