use thiserror::Error;

/// Failures a chat submission can surface to the presentation layer.
///
/// Capture failures are absent on purpose: the capture protocol degrades to
/// an empty string and never escalates. Schema mismatches are resolved
/// during storage startup and never reach a submission.
#[derive(Error, Debug)]
pub enum ChatError {
    /// No API key configured. Actionable, not retried.
    #[error("API key missing. Open Settings and add a key.")]
    AuthMissing,

    /// Upstream provider or network failure; carries the upstream message.
    #[error("{0}")]
    Provider(String),

    /// The conversation store rejected a write.
    #[error("storage error: {0}")]
    Storage(String),

    /// The session was deleted while its stream was in flight.
    #[error("session deleted")]
    Cancelled,
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}
