//! panel-core - comparison orchestration and backend health monitoring
//!
//! This crate provides:
//! - A fan-out orchestrator that sends one prompt to several LLM providers
//!   concurrently and tracks each provider's result independently
//! - A polling health monitor with a hover-expandable status indicator
//! - Pure formatting helpers for durations, counts and metadata
//! - An HTTP client for the `/llm/*` comparison REST service

pub mod backend;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod present;
pub mod types;

// Re-export main types for convenience
pub use backend::{ComparisonBackend, HttpBackend};
pub use error::{CompareError, Result};
pub use health::{
    HealthConfig, HealthHandle, HealthIndicator, HealthMonitor, HealthState, IndicatorView,
    Reachability,
};
pub use orchestrator::{ComparisonOrchestrator, ComparisonRun, OrchestratorConfig};
pub use types::{Completion, ProviderResult, ProviderStatus, RateLimit, ResponseMetadata};
