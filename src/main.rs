//! llmopt - metrics-driven LLM model routing
//!
//! Records cost, latency and quality for every generation call and routes
//! new prompts to a model chosen from that history.

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llmopt::config::{self, Config};
use llmopt::provider::CallParams;
use llmopt::storage::{self, aggregates, records};
use llmopt::{Coordinator, UnifiedLlm};

const DEFAULT_CONFIG_PATH: &str = "llmopt.toml";

const BENCH_PROMPTS: &[&str] = &[
    "Explain the concept of transformers in 3 lines.",
    "Summarize the plot of a detective novel in one paragraph.",
    "List five practical uses of a hash map.",
    "What is the difference between latency and throughput?",
    "Write a haiku about caching.",
];

#[derive(Parser)]
#[command(name = "llmopt")]
#[command(about = "Metrics-driven LLM model routing")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults apply if omitted and llmopt.toml is absent)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the metrics database path
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the metrics database and apply migrations
    Init,

    /// Validate configuration file
    Check,

    /// Show the pricing table
    Pricing,

    /// Execute one generation call and record it
    Call {
        /// Model name
        #[arg(short, long)]
        model: String,

        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Registered provider name
        #[arg(long, default_value = "mock")]
        provider: String,

        /// Extra call parameter as key=value (repeatable; JSON values accepted)
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Run the analyzers and print the routing decision
    Decide {
        /// Override routing.latency_threshold_ms
        #[arg(short, long, value_parser = parse_threshold)]
        threshold: Option<f64>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decide on a model, then send the prompt to it
    Route {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Registered provider name
        #[arg(long, default_value = "mock")]
        provider: String,

        /// Override routing.latency_threshold_ms
        #[arg(short, long, value_parser = parse_threshold)]
        threshold: Option<f64>,
    },

    /// Run N calls spread over provider:model targets, then summarize
    Bench {
        /// Total number of calls
        #[arg(short, long, default_value_t = 100)]
        n: usize,

        /// Targets as provider:model (repeatable)
        #[arg(long = "target", default_values_t = vec![
            "mock:small-latest".to_string(),
            "mock:large-latest".to_string(),
        ])]
        targets: Vec<String>,

        /// Pause between calls in milliseconds
        #[arg(long, default_value_t = 20)]
        pace_ms: u64,
    },

    /// Show the most recent recorded calls
    Logs {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llmopt={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init => {
            open_pool(&config).await?;
            tracing::info!(path = %config.database.path, "Database initialized");
            Ok(())
        }

        Commands::Check => {
            let pricing = config.pricing_table()?;
            println!("Configuration OK");
            println!("  database:  {}", config.database.path);
            println!("  threshold: {} ms", config.routing.latency_threshold_ms);
            println!("  timeout:   {} ms", config.execution.timeout_ms);
            println!(
                "  providers: {}",
                config
                    .providers
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  pricing:   {} entries", pricing.len());
            Ok(())
        }

        Commands::Pricing => {
            let pricing = config.pricing_table()?;
            if pricing.is_empty() {
                println!("No pricing entries configured; every call is recorded at zero cost.");
            }
            for (key, entry) in pricing.entries() {
                println!(
                    "{:<32} in: {:>10.4}/M  out: {:>10.4}/M",
                    key, entry.input_per_million, entry.output_per_million
                );
            }
            Ok(())
        }

        Commands::Call {
            model,
            prompt,
            provider,
            params,
        } => {
            let llm = UnifiedLlm::from_config(&config, open_pool(&config).await?)?;
            let params = parse_params(&params)?;
            let result = llm.execute(&provider, &model, &prompt, params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Decide { threshold, json } => {
            let pool = open_pool(&config).await?;
            let threshold = threshold.unwrap_or(config.routing.latency_threshold_ms);
            let decision = Coordinator::new(pool).decide(threshold).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!("Final decision: {}", decision.chosen_model);
                println!("Agent messages:");
                for msg in decision.messages.iter() {
                    println!(
                        "  {:<18} {:<8} {:<24} {:.6}",
                        msg.agent,
                        msg.metric.as_str(),
                        msg.recommendation,
                        msg.value
                    );
                }
            }
            Ok(())
        }

        Commands::Route {
            prompt,
            provider,
            threshold,
        } => {
            let pool = open_pool(&config).await?;
            let llm = UnifiedLlm::from_config(&config, pool.clone())?;
            let threshold = threshold.unwrap_or(config.routing.latency_threshold_ms);
            let decision = Coordinator::new(pool).decide(threshold).await?;

            tracing::info!(model = %decision.chosen_model, "Routing prompt");
            let result = llm
                .execute(&provider, &decision.chosen_model, &prompt, CallParams::new())
                .await?;
            println!(
                "Routed to {} ({} chars, quality={}, status={})",
                result.model,
                result.response_text.chars().count(),
                result.quality_proxy,
                result.status
            );
            Ok(())
        }

        Commands::Bench { n, targets, pace_ms } => {
            let pool = open_pool(&config).await?;
            let llm = UnifiedLlm::from_config(&config, pool.clone())?;
            let targets = targets
                .iter()
                .map(|t| {
                    t.split_once(':')
                        .map(|(p, m)| (p.to_string(), m.to_string()))
                        .with_context(|| format!("Target '{}' is not provider:model", t))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            anyhow::ensure!(!targets.is_empty(), "At least one target is required");

            tracing::info!(calls = n, targets = targets.len(), "Starting benchmark");
            let mut failures = 0usize;
            for i in 0..n {
                let (provider, model) = &targets[i % targets.len()];
                let prompt = BENCH_PROMPTS[(i / targets.len()) % BENCH_PROMPTS.len()];
                let result = llm.execute(provider, model, prompt, CallParams::new()).await?;
                if !result.is_ok() {
                    failures += 1;
                }
                if pace_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(pace_ms)).await;
                }
            }
            tracing::info!(calls = n, failures, "Benchmark finished");

            println!(
                "{:<10} {:<20} {:>6} {:>6} {:>12} {:>10} {:>10} {:>12} {:>8}",
                "provider",
                "model",
                "calls",
                "errors",
                "avg_lat_ms",
                "p50_ms",
                "p95_ms",
                "cost_usd",
                "quality"
            );
            for row in aggregates::summary_by_model(&pool).await? {
                println!(
                    "{:<10} {:<20} {:>6} {:>6} {:>12.2} {:>10.2} {:>10.2} {:>12.6} {:>8.4}",
                    row.provider,
                    row.model,
                    row.total_requests,
                    row.error_count,
                    row.avg_latency_ms,
                    row.p50_latency_ms,
                    row.p95_latency_ms,
                    row.avg_cost_usd,
                    row.avg_quality
                );
            }
            Ok(())
        }

        Commands::Logs { limit } => {
            let pool = open_pool(&config).await?;
            for call in records::recent_calls(&pool, limit).await? {
                println!(
                    "{} {} {}:{} {:.1}ms {} cost={} quality={}",
                    call.ts,
                    call.request_id,
                    call.provider,
                    call.model,
                    call.latency_ms,
                    call.status,
                    call.cost_usd.map_or("-".to_string(), |c| format!("{:.6}", c)),
                    call.quality_proxy.map_or("-".to_string(), |q| format!("{:.4}", q)),
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(Config::from_file(DEFAULT_CONFIG_PATH)?)
        }
        None => Ok(Config::default()),
    }
}

async fn open_pool(config: &Config) -> anyhow::Result<SqlitePool> {
    storage::init_pool(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database.path))
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let threshold: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    config::validate_latency_threshold(threshold).map_err(|e| e.to_string())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type.
fn parse_params(raw: &[String]) -> anyhow::Result<CallParams> {
    let mut params = CallParams::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("Parameter '{}' is not key=value", item))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_override_rejects_non_finite() {
        for bad in ["NaN", "inf", "-1"] {
            assert!(
                Cli::try_parse_from(["llmopt", "decide", "--threshold", bad]).is_err(),
                "accepted threshold {}",
                bad
            );
        }
    }

    #[test]
    fn test_threshold_override_accepted() {
        let cli = Cli::try_parse_from(["llmopt", "route", "-p", "hi", "-t", "120"]).unwrap();
        match cli.command {
            Commands::Route { threshold, .. } => assert_eq!(threshold, Some(120.0)),
            _ => panic!("expected route command"),
        }
    }
}
