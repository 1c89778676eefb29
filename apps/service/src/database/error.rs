use thiserror::Error;

/// Failures of the observation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    QueryFailure(#[from] libsql::Error),

    #[error("Connection pool unavailable: {0}")]
    Pool(String),

    #[error("Corrupt observation row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StoreError {
    fn from(error: deadpool::managed::PoolError<libsql::Error>) -> Self {
        StoreError::Pool(error.to_string())
    }
}
