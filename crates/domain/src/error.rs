//! Unified error type shared across the pipeline's crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Odds vendor error (status={status}): {message}")]
    OddsApi { status: u16, message: String },

    #[error("Rate limited — retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Schedule unavailable for {date}: {reason}")]
    ScheduleUnavailable { date: String, reason: String },

    #[error("Agent schema repair failed for {agent}: {reason}")]
    SchemaRepairFailed { agent: String, reason: String },

    #[error("Batch exhausted retries for stage {stage}: {remaining} games unresolved")]
    BatchExhausted { stage: String, remaining: usize },

    #[error("Confidence scale invalid: {0}")]
    ConfidenceScaleInvalid(String),

    #[error("Stale data: {0}")]
    StaleData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
