//! Error taxonomy for the notification pipeline.
//!
//! Failures are recovered as locally as possible: a bad article never sinks
//! its source, a bad source never sinks the run. Only configuration errors
//! and genuinely unhandled failures escape to the process boundary, where
//! `main` turns them into a non-zero exit after a best-effort operator alert.

use thiserror::Error;

/// Top-level error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration (no sources, bad selector, missing
    /// credentials). Fatal to the run.
    #[error("configuration error: {0}")]
    Config(String),

    /// A publisher endpoint could not be fetched after retries. Local to one
    /// source; the orchestrator logs it and moves on.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The messaging API rejected a delivery after the text fallback.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Reading or writing a persisted state file failed.
    #[error("state file error: {0}")]
    State(#[from] std::io::Error),

    /// A state file or feed body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A failed HTTP fetch, after the retry policy was exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status that is not retryable,
    /// or kept failing until attempts ran out.
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },

    /// The request never produced a response (DNS, connect, timeout).
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
