/// Core error type for the moderation bot.
///
/// Adapter crates map their specific errors into this type so the core can
/// tell transient failures (retry on the next natural trigger) apart from
/// recognized platform answers (terminal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transient failure talking to an outside service (network, timeout).
    #[error("external error: {0}")]
    External(String),

    /// The platform understood the request and refused it, e.g. the message
    /// is already gone.
    #[error("platform error: {0}")]
    Platform(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn is_platform(&self) -> bool {
        matches!(self, Error::Platform(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
