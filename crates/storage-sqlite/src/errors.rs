//! Storage-level errors and their mapping onto the engine error type.

use fieldsync_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stored document is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Database writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        if !matches!(err, StorageError::Query(diesel::result::Error::NotFound)) {
            log::error!("[OfflineStore] {}", err);
        }
        let db_err = match err {
            StorageError::Query(diesel::result::Error::NotFound) => {
                DatabaseError::NotFound("record not found".to_string())
            }
            StorageError::Query(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::Pool(e) => DatabaseError::PoolCreationFailed(e.to_string()),
            StorageError::Connection(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Migration(msg) => DatabaseError::MigrationFailed(msg),
            StorageError::Payload(e) => DatabaseError::Internal(e.to_string()),
            StorageError::WriterUnavailable(msg) => DatabaseError::Internal(msg),
            StorageError::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
        };
        Error::Database(db_err)
    }
}
