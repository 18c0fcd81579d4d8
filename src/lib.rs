//! llmopt - metrics-driven LLM model routing
//!
//! This library provides the closed feedback loop behind the `llmopt` tool:
//! the call wrapper records cost, latency and quality for every generation,
//! and the router reads those records back to pick the next model.

pub mod config;
pub mod error;
pub mod pricing;
pub mod provider;
pub mod router;
pub mod storage;
pub mod text;
pub mod unified;

pub use config::Config;
pub use error::{Error, Result};
pub use router::{Coordinator, Decision};
pub use unified::{CallResult, UnifiedLlm};
