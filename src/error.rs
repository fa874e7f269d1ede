/// Pipeline error taxonomy.
///
/// `Validation` is permanent: the payload is rejected, nothing is written
/// and no alert fires. The remaining variants are transient infrastructure
/// failures surfaced to the caller so an upstream layer may retry. Alert
/// delivery failures never appear here; the dispatcher logs and swallows
/// them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_sqlite::InteractError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether the caller may retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Pool(_) | Error::Unavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_permanent() {
        assert!(!Error::Validation("too large".into()).is_transient());
        assert!(!Error::NotFound("missing".into()).is_transient());
    }

    #[test]
    fn test_unavailable_is_transient() {
        assert!(Error::Unavailable("connection refused".into()).is_transient());
    }
}
