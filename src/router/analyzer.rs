//! Analyzer agents: one recommendation per metric from historical aggregates.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::storage::{aggregates, ModelAggregate};

/// The metric an analyzer optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cost,
    Latency,
    Quality,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cost => "cost",
            Metric::Latency => "latency",
            Metric::Quality => "quality",
        }
    }

    /// Direction in which this metric improves.
    pub fn objective(&self) -> Objective {
        match self {
            Metric::Cost | Metric::Latency => Objective::Minimize,
            Metric::Quality => Objective::Maximize,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Minimize,
    Maximize,
}

impl Objective {
    /// Pick the best row. On ties the earliest row wins.
    pub fn select<'a>(&self, table: &'a [ModelAggregate]) -> Option<&'a ModelAggregate> {
        let mut rows = table.iter();
        let mut best = rows.next()?;
        for row in rows {
            let better = match self {
                Objective::Minimize => row.value < best.value,
                Objective::Maximize => row.value > best.value,
            };
            if better {
                best = row;
            }
        }
        Some(best)
    }
}

/// A single analyzer's recommendation. Built fresh for every decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMessage {
    pub agent: String,
    pub metric: Metric,
    pub recommendation: String,
    pub value: f64,
}

/// A component that aggregates history per model and recommends one model.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn metric(&self) -> Metric;

    /// Query the per-model aggregate this analyzer works from.
    async fn analyze(&self, pool: &SqlitePool) -> Result<Vec<ModelAggregate>>;

    /// Turn an aggregate table into a recommendation.
    ///
    /// An empty table yields [`Error::NoHistoricalData`].
    fn message(&self, table: &[ModelAggregate]) -> Result<AgentMessage> {
        let metric = self.metric();
        let best = metric
            .objective()
            .select(table)
            .ok_or(Error::NoHistoricalData { metric })?;

        Ok(AgentMessage {
            agent: self.name().to_string(),
            metric,
            recommendation: best.model.clone(),
            value: best.value,
        })
    }
}

/// Recommends the model with the lowest mean cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostAnalyzer;

#[async_trait]
impl Analyzer for CostAnalyzer {
    fn name(&self) -> &'static str {
        "CostAnalyzer"
    }

    fn metric(&self) -> Metric {
        Metric::Cost
    }

    async fn analyze(&self, pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
        aggregates::mean_cost_by_model(pool).await
    }
}

/// Recommends the model with the lowest mean latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyAnalyzer;

#[async_trait]
impl Analyzer for LatencyAnalyzer {
    fn name(&self) -> &'static str {
        "LatencyProfiler"
    }

    fn metric(&self) -> Metric {
        Metric::Latency
    }

    async fn analyze(&self, pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
        aggregates::mean_latency_by_model(pool).await
    }
}

/// Recommends the model with the highest mean quality proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAnalyzer;

#[async_trait]
impl Analyzer for QualityAnalyzer {
    fn name(&self) -> &'static str {
        "QualityEvaluator"
    }

    fn metric(&self) -> Metric {
        Metric::Quality
    }

    async fn analyze(&self, pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
        aggregates::mean_quality_by_model(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(model: &str, value: f64) -> ModelAggregate {
        ModelAggregate {
            model: model.to_string(),
            value,
            samples: 1,
        }
    }

    #[test]
    fn test_cost_recommends_cheapest() {
        let table = vec![row("A", 0.002), row("B", 0.005)];
        let msg = CostAnalyzer.message(&table).unwrap();
        assert_eq!(msg.agent, "CostAnalyzer");
        assert_eq!(msg.metric, Metric::Cost);
        assert_eq!(msg.recommendation, "A");
        assert_eq!(msg.value, 0.002);
    }

    #[test]
    fn test_latency_recommends_fastest() {
        let table = vec![row("large", 180.0), row("small", 120.0)];
        let msg = LatencyAnalyzer.message(&table).unwrap();
        assert_eq!(msg.recommendation, "small");
        assert_eq!(msg.value, 120.0);
    }

    #[test]
    fn test_quality_recommends_highest() {
        let table = vec![row("large", 0.71), row("small", 0.64)];
        let msg = QualityAnalyzer.message(&table).unwrap();
        assert_eq!(msg.metric, Metric::Quality);
        assert_eq!(msg.recommendation, "large");
    }

    #[test]
    fn test_empty_table_is_an_error() {
        let err = LatencyAnalyzer.message(&[]).unwrap_err();
        assert!(matches!(
            err,
            Error::NoHistoricalData {
                metric: Metric::Latency
            }
        ));
        assert!(err.to_string().contains("latency"));
    }

    #[test]
    fn test_ties_keep_first_row() {
        let table = vec![row("A", 0.5), row("B", 0.5), row("C", 0.5)];
        assert_eq!(Objective::Minimize.select(&table).unwrap().model, "A");
        assert_eq!(Objective::Maximize.select(&table).unwrap().model, "A");
    }

    #[test]
    fn test_metric_objectives() {
        assert_eq!(Metric::Cost.objective(), Objective::Minimize);
        assert_eq!(Metric::Latency.objective(), Objective::Minimize);
        assert_eq!(Metric::Quality.objective(), Objective::Maximize);
        assert_eq!(
            serde_json::to_string(&Metric::Quality).unwrap(),
            "\"quality\""
        );
    }
}
