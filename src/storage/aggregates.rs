//! Per-model aggregate queries consumed by the analyzers.
//!
//! Every query groups by model and orders by model name so callers see a
//! stable row order for identical data.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;

/// A per-model summary statistic.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct ModelAggregate {
    pub model: String,
    pub value: f64,
    pub samples: i64,
}

/// Mean cost per model over successful calls (requests joined with responses).
pub async fn mean_cost_by_model(pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
    let rows = sqlx::query_as::<_, ModelAggregate>(
        "SELECT r.model AS model, AVG(s.cost_usd) AS value, COUNT(*) AS samples \
         FROM requests r JOIN responses s ON r.request_id = s.request_id \
         GROUP BY r.model ORDER BY r.model",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mean latency per model over every recorded attempt, including errors.
pub async fn mean_latency_by_model(pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
    let rows = sqlx::query_as::<_, ModelAggregate>(
        "SELECT model, AVG(latency_ms) AS value, COUNT(*) AS samples \
         FROM requests GROUP BY model ORDER BY model",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mean quality proxy per model over successful calls.
pub async fn mean_quality_by_model(pool: &SqlitePool) -> Result<Vec<ModelAggregate>> {
    let rows = sqlx::query_as::<_, ModelAggregate>(
        "SELECT r.model AS model, AVG(s.quality_proxy) AS value, COUNT(*) AS samples \
         FROM requests r JOIN responses s ON r.request_id = s.request_id \
         GROUP BY r.model ORDER BY r.model",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Per provider/model roll-up used for run summaries.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ModelSummary {
    pub provider: String,
    pub model: String,
    pub total_requests: i64,
    pub error_count: i64,
    pub avg_latency_ms: f64,
    #[sqlx(skip)]
    pub p50_latency_ms: f64,
    #[sqlx(skip)]
    pub p95_latency_ms: f64,
    pub avg_cost_usd: f64,
    pub avg_quality: f64,
}

/// Summarize every provider/model pair in the store.
///
/// Cost and quality averages cover successful calls only and are 0.0 when a
/// pair has none. Latency percentiles cover every attempt.
pub async fn summary_by_model(pool: &SqlitePool) -> Result<Vec<ModelSummary>> {
    let mut rows = sqlx::query_as::<_, ModelSummary>(
        "SELECT \
         r.provider AS provider, \
         r.model AS model, \
         COUNT(*) AS total_requests, \
         COUNT(CASE WHEN r.status = 'error' THEN 1 END) AS error_count, \
         COALESCE(AVG(r.latency_ms), 0.0) AS avg_latency_ms, \
         COALESCE(AVG(s.cost_usd), 0.0) AS avg_cost_usd, \
         COALESCE(AVG(s.quality_proxy), 0.0) AS avg_quality \
         FROM requests r LEFT JOIN responses s ON r.request_id = s.request_id \
         GROUP BY r.provider, r.model ORDER BY r.provider, r.model",
    )
    .fetch_all(pool)
    .await?;

    let latencies = sqlx::query_as::<_, (String, String, f64)>(
        "SELECT provider, model, latency_ms FROM requests \
         ORDER BY provider, model, latency_ms",
    )
    .fetch_all(pool)
    .await?;

    // Both result sets share the provider/model ordering
    let mut latencies = latencies.into_iter().peekable();
    for row in &mut rows {
        let mut samples = Vec::with_capacity(row.total_requests as usize);
        while let Some((_, _, latency)) =
            latencies.next_if(|(p, m, _)| *p == row.provider && *m == row.model)
        {
            samples.push(latency);
        }
        row.p50_latency_ms = quantile(&samples, 0.5);
        row.p95_latency_ms = quantile(&samples, 0.95);
    }

    Ok(rows)
}

/// Quantile of ascending `sorted` samples with linear interpolation between
/// the two nearest ranks. Returns 0.0 for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
