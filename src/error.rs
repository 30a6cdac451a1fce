use thiserror::Error;

/// Errors surfaced by the upstream API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The bearer credential was rejected (HTTP 401)
    #[error("auth_failed")]
    Unauthorized,

    /// Throttled repeatedly and the local retry budget ran out
    #[error("rate_limit_retry_exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// Server asked us to wait longer than we are willing to block for.
    /// The rendered form is consumed verbatim by callers.
    #[error("rate_limit_long:{0}")]
    LongCooldown(u64),

    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Only these abort a phase; everything else degrades to a warning.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::LongCooldown(_))
    }

    /// Seconds the caller should wait before trying again, if known
    pub fn cooldown_secs(&self) -> Option<u64> {
        match self {
            ApiError::LongCooldown(secs) => Some(*secs),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
