pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to callers of the marketplace service. None of these
/// are fatal to the daemon; the caller reports the message and the user can
/// correct input and retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input (no dates chosen, empty body, bad rating).
    #[error("{0}")]
    Validation(String),

    /// The requested change collides with existing rows: overlapping dates,
    /// a duplicate block or review.
    #[error("{0}")]
    Conflict(String),

    /// Guest count exceeds what the property allows.
    #[error("property sleeps at most {max} guests, requested {requested}")]
    Capacity { requested: i64, max: i64 },

    /// The action needs a signed-in identity, or a role the caller lacks.
    #[error("{0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The store call itself failed.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}
