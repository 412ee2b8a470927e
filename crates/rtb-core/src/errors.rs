/// Core error type for the bot.
///
/// Adapter crates map their SDK-specific errors into this type so the core
/// can handle failures consistently (fatal config vs retryable upstream).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transient failure talking to the results provider. Distinct from
    /// "no new result", which is `Ok(None)` on the port.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Failure delivering a notification. The poller keeps the last-seen
    /// marker unchanged so the same result is retried next tick.
    #[error("delivery error: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, Error>;
