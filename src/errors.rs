use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend error: status={status}: {message}")]
    Backend { status: u16, message: String },

    #[error("realtime channel error: {0}")]
    Realtime(String),

    #[error("push messaging is not supported on this platform")]
    PushUnsupported,

    #[error("push permission denied")]
    PermissionDenied,

    #[error("no push subscription exists")]
    NoSubscription,

    #[error("malformed quiet-hours time `{0}` (expected HH:MM)")]
    BadClockTime(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the operation that produced this error can be retried by
    /// the caller without any state repair.
    ///
    /// Transport failures and 5xx/429 backend responses are transient;
    /// everything else needs a decision from the user or the embedder.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport(_) | EngineError::Realtime(_) => true,
            EngineError::Backend { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}
