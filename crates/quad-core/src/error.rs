use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ForbiddenStatement(String),

    /// Any failure reported by the control-plane or a target database,
    /// including pool exhaustion and connect timeouts.
    #[error("{0}")]
    Database(String),

    #[error("Credential error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Helper for creating validation errors
    ///
    /// # Example
    /// ```
    /// use quad_core::Error;
    /// let err = Error::validation("Connection ID is required");
    /// assert_eq!(err.to_string(), "Connection ID is required");
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Helper for creating not-found errors
    ///
    /// # Example
    /// ```
    /// use quad_core::Error;
    /// let err = Error::not_found("Connection not found");
    /// ```
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Helper for creating upstream database errors
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Helper for creating configuration errors
    pub fn config_error(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Helper for creating general errors with a message
    pub fn message(msg: impl Into<String>) -> Self {
        Error::Other(anyhow::anyhow!("{}", msg.into()))
    }

    /// True for errors caused by the caller's input rather than by a backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::Conflict(_)
                | Error::ForbiddenStatement(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_pass_through() {
        let err = Error::database("relation \"missing\" does not exist");
        assert_eq!(err.to_string(), "relation \"missing\" does not exist");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::validation("x").is_client_error());
        assert!(Error::not_found("x").is_client_error());
        assert!(Error::ForbiddenStatement("x".into()).is_client_error());
        assert!(!Error::Crypto("x".into()).is_client_error());
    }
}
