use thiserror::Error;

/// revtrack error types
#[derive(Error, Debug)]
pub enum RevtrackError {
    /// Chat has no linked accounts
    #[error("this chat has no linked accounts")]
    NotLinked,

    /// A token was supplied but matched no linked account
    #[error("no linked account matches `{0}`")]
    TokenNotFound(String),

    /// Malformed command input
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Analytics source error or timeout for one account
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// Link store could not be read or written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Chat transport (Telegram) error
    #[error("transport error: {0}")]
    Transport(String),
}

impl RevtrackError {
    /// Errors caused by the requester rather than the system.
    /// These are answered in chat and never logged as system errors.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotLinked | Self::TokenNotFound(_) | Self::InvalidArguments(_)
        )
    }
}

/// Result type alias for revtrack
pub type Result<T> = std::result::Result<T, RevtrackError>;
