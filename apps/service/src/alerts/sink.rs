use async_trait::async_trait;
use thiserror::Error;

/// Failure delivering one notification to one sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sink responded with status {0}")]
    Status(u16),
}

/// Alert sink trait - a notification destination addressed by title and message
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one notification
    async fn deliver(&self, title: &str, message: &str) -> Result<(), SinkError>;

    /// Get the sink name for logging
    fn name(&self) -> &str;
}
