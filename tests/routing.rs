//! Integration tests for the analyzers and the coordinator.
//!
//! Seeds an in-memory SQLite database with known request/response rows and
//! checks the per-model aggregates and the resulting routing decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use llmopt::pricing::{PricingEntry, PricingTable};
use llmopt::provider::{CallParams, MockProvider, ProviderRegistry};
use llmopt::router::{
    Analyzer, CostAnalyzer, LatencyAnalyzer, Metric, QualityAnalyzer, RouteBasis,
};
use llmopt::storage::{self, aggregates, persist_call, CallStatus, RequestRecord, ResponseRecord};
use llmopt::{Coordinator, Error, UnifiedLlm};

/// Global counter for generating unique request IDs.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Create an in-memory SQLite pool with migrations applied.
async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    storage::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Insert one call. `outcome` is `Some((cost, quality))` for a successful
/// call and `None` for an error-status call.
async fn seed_call(pool: &SqlitePool, model: &str, latency_ms: f64, outcome: Option<(f64, f64)>) {
    let request_id = format!(
        "test-req-{}",
        REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let status = if outcome.is_some() {
        CallStatus::Ok
    } else {
        CallStatus::Error
    };

    let request = RequestRecord {
        request_id: request_id.clone(),
        ts: chrono::Utc::now().to_rfc3339(),
        provider: "mock".to_string(),
        model: model.to_string(),
        prompt_hash: "0".repeat(64),
        prompt_len: 10,
        params: CallParams::new(),
        latency_ms,
        status,
        error_msg: outcome.is_none().then(|| "seeded failure".to_string()),
    };
    let response = outcome.map(|(cost_usd, quality_proxy)| ResponseRecord {
        request_id,
        response_text: "seeded".to_string(),
        tokens_in: 10,
        tokens_out: 20,
        cost_usd,
        quality_proxy,
    });

    persist_call(pool, &request, response.as_ref())
        .await
        .expect("Failed to seed call");
}

/// Two models with opposite strengths:
/// - "fast": mean latency 120ms, cheap (0.001), lower quality (0.5)
/// - "slow": mean latency 300ms, pricier (0.004), higher quality (0.8)
async fn seed_standard_data(pool: &SqlitePool) {
    seed_call(pool, "fast", 100.0, Some((0.001, 0.5))).await;
    seed_call(pool, "fast", 140.0, Some((0.001, 0.5))).await;
    seed_call(pool, "slow", 300.0, Some((0.004, 0.8))).await;
}

#[tokio::test]
async fn test_cost_analyzer_recommends_lowest_mean_cost() {
    let pool = setup_pool().await;
    seed_call(&pool, "A", 50.0, Some((0.001, 0.5))).await;
    seed_call(&pool, "A", 50.0, Some((0.003, 0.5))).await;
    seed_call(&pool, "B", 50.0, Some((0.005, 0.5))).await;

    let table = CostAnalyzer.analyze(&pool).await.unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].model, "A");
    assert!((table[0].value - 0.002).abs() < 1e-12);
    assert_eq!(table[0].samples, 2);

    let msg = CostAnalyzer.message(&table).unwrap();
    assert_eq!(msg.recommendation, "A");
    assert_eq!(msg.metric, Metric::Cost);
}

#[tokio::test]
async fn test_latency_includes_error_rows_cost_does_not() {
    let pool = setup_pool().await;
    seed_call(&pool, "A", 200.0, Some((0.002, 0.6))).await;
    seed_call(&pool, "B", 10.0, None).await;

    let latency = LatencyAnalyzer.analyze(&pool).await.unwrap();
    assert_eq!(latency.len(), 2);
    assert_eq!(LatencyAnalyzer.message(&latency).unwrap().recommendation, "B");

    let cost = CostAnalyzer.analyze(&pool).await.unwrap();
    assert_eq!(cost.len(), 1);
    assert_eq!(cost[0].model, "A");

    let quality = QualityAnalyzer.analyze(&pool).await.unwrap();
    assert_eq!(quality.len(), 1);
}

#[tokio::test]
async fn test_fast_history_routes_by_quality() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;

    let decision = Coordinator::new(pool).decide(150.0).await.unwrap();

    assert_eq!(decision.messages.latency.recommendation, "fast");
    assert_eq!(decision.messages.latency.value, 120.0);
    assert_eq!(decision.basis, RouteBasis::Quality);
    assert_eq!(decision.chosen_model, "slow");
    assert_eq!(decision.chosen_model, decision.messages.quality.recommendation);
}

#[tokio::test]
async fn test_slow_history_routes_by_cost() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;

    let decision = Coordinator::new(pool).decide(100.0).await.unwrap();

    assert_eq!(decision.basis, RouteBasis::Cost);
    assert_eq!(decision.chosen_model, "fast");
}

#[tokio::test]
async fn test_threshold_equal_to_best_latency_routes_by_cost() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;

    let decision = Coordinator::new(pool).decide(120.0).await.unwrap();

    assert_eq!(decision.basis, RouteBasis::Cost);
    assert_eq!(decision.chosen_model, decision.messages.cost.recommendation);
}

#[tokio::test]
async fn test_decision_is_deterministic() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;
    // Tie on cost between "fast" and "tied"; name order breaks it
    seed_call(&pool, "tied", 500.0, Some((0.001, 0.1))).await;

    let coordinator = Coordinator::new(pool);
    let first = coordinator.decide(150.0).await.unwrap();
    let second = coordinator.decide(150.0).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.messages.cost.recommendation, "fast");
}

#[tokio::test]
async fn test_messages_keep_fixed_order() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;

    let decision = Coordinator::new(pool).decide(150.0).await.unwrap();
    let agents: Vec<&str> = decision.messages.iter().map(|m| m.agent.as_str()).collect();
    assert_eq!(agents, vec!["CostAnalyzer", "LatencyProfiler", "QualityEvaluator"]);
}

#[tokio::test]
async fn test_empty_history_is_an_explicit_error() {
    let pool = setup_pool().await;

    let err = Coordinator::new(pool).decide(150.0).await.unwrap_err();
    assert!(
        matches!(err, Error::NoHistoricalData { metric: Metric::Cost }),
        "unexpected error: {}",
        err
    );
}

#[tokio::test]
async fn test_only_failed_history_is_an_explicit_error() {
    let pool = setup_pool().await;
    seed_call(&pool, "A", 40.0, None).await;

    // Latency has data, but cost runs first and has nothing to average
    let err = Coordinator::new(pool).decide(150.0).await.unwrap_err();
    assert!(matches!(err, Error::NoHistoricalData { metric: Metric::Cost }));
}

#[tokio::test]
async fn test_summary_by_model() {
    let pool = setup_pool().await;
    seed_standard_data(&pool).await;
    seed_call(&pool, "slow", 100.0, None).await;

    let rows = aggregates::summary_by_model(&pool).await.unwrap();
    assert_eq!(rows.len(), 2);

    let slow = rows.iter().find(|r| r.model == "slow").unwrap();
    assert_eq!(slow.total_requests, 2);
    assert_eq!(slow.error_count, 1);
    assert_eq!(slow.avg_latency_ms, 200.0);
    assert_eq!(slow.avg_cost_usd, 0.004);
    assert_eq!(slow.avg_quality, 0.8);
    // Percentiles interpolate between the 100 ms and 300 ms attempts
    assert_eq!(slow.p50_latency_ms, 200.0);
    assert!((slow.p95_latency_ms - 290.0).abs() < 1e-9);

    let fast = rows.iter().find(|r| r.model == "fast").unwrap();
    assert_eq!(fast.total_requests, 2);
    assert_eq!(fast.p50_latency_ms, 120.0);
    assert!((fast.p95_latency_ms - 138.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_recorded_calls_feed_next_decision() {
    let pool = setup_pool().await;

    let pricing = PricingTable::from_entries(vec![
        (
            "mock:small-latest".to_string(),
            PricingEntry::new("mock:small-latest", 0.5, 1.5),
        ),
        (
            "mock:large-latest".to_string(),
            PricingEntry::new("mock:large-latest", 5.0, 15.0),
        ),
    ])
    .unwrap();
    let mut providers = ProviderRegistry::new();
    providers.register("mock", Arc::new(MockProvider::with_delay_unit(Duration::ZERO)));
    let llm = UnifiedLlm::new(
        providers,
        Arc::new(pricing),
        pool.clone(),
        Duration::from_secs(5),
    );

    let prompt = "Explain the concept of transformers in 3 lines.";
    let small = llm
        .execute("mock", "small-latest", prompt, CallParams::new())
        .await
        .unwrap();
    let large = llm
        .execute("mock", "large-latest", prompt, CallParams::new())
        .await
        .unwrap();
    assert!(small.cost_usd < large.cost_usd);
    assert!(small.quality_proxy < large.quality_proxy);

    let coordinator = Coordinator::new(pool);

    // Any observed latency is below this, so quality decides
    let relaxed = coordinator.decide(1e9).await.unwrap();
    assert_eq!(relaxed.chosen_model, "large-latest");
    assert_eq!(relaxed.messages.cost.value, small.cost_usd);
    assert_eq!(relaxed.messages.quality.value, large.quality_proxy);

    // No latency is below zero, so cost decides
    let strict = coordinator.decide(0.0).await.unwrap();
    assert_eq!(strict.chosen_model, "small-latest");
}
