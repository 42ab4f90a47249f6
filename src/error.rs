use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Only these may stop the process, and only at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AI_API_KEY is not set. Add it to the environment or to .env")]
    MissingApiKey,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Outbound delivery failures reported by a messaging transport.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("messaging session is not connected")]
    NotConnected,

    #[error("transport request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Failures of a single text-generation attempt.
///
/// These never reach the end user; the reply client maps each one to a
/// fixed fallback string.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,

    #[error("generation request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("generation API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation returned no text")]
    Empty,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            // Request URLs may carry credentials; never let them into logs.
            Self::Transport(err.without_url())
        }
    }
}
