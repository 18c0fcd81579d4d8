//! Metrics-driven model routing.
//!
//! This module turns historical call metrics into a routing decision:
//! - Analyzers derive one recommendation each (cost, latency, quality)
//! - The coordinator combines them with a latency-gated policy

mod analyzer;
mod coordinator;

pub use analyzer::{
    AgentMessage, Analyzer, CostAnalyzer, LatencyAnalyzer, Metric, Objective, QualityAnalyzer,
};
pub use coordinator::{route, AgentMessages, Coordinator, Decision, RouteBasis};
