use thiserror::Error;

/// Errors reported by a [`DocumentStore`](crate::store::DocumentStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("field `{0}` does not hold an integer")]
    NotNumeric(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Errors surfaced to callers of the feed core.
///
/// Nothing in the core retries on failure. A caller holding an optimistic
/// counter rolls it back when it gets an `Err`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("post {0} not found")]
    PostNotFound(String),

    /// The cursor does not describe a position in the feed. Paginators
    /// answer this with an empty page instead of failing.
    #[error("stale cursor: {0}")]
    StaleCursor(String),

    #[error("invalid page size {0}, must be at least 1")]
    InvalidPageSize(usize),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
            StoreError::NotFound { collection, id } if collection == crate::POSTS => {
                Error::PostNotFound(id)
            }
            err @ StoreError::NotFound { .. } => Error::InvalidDocument(err.to_string()),
            err @ StoreError::NotNumeric(_) => Error::InvalidDocument(err.to_string()),
            StoreError::Malformed(e) => Error::InvalidDocument(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidDocument(err.to_string())
    }
}

impl warp::reject::Reject for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;
