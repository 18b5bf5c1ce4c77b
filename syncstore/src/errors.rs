use thiserror::Error;

use crate::schema::EntityKind;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot encode {kind}.{column}: {reason}")]
    Encode {
        kind: EntityKind,
        column: &'static str,
        reason: String,
    },

    #[error("cannot decode {kind}.{column}: {reason}")]
    Decode {
        kind: EntityKind,
        column: &'static str,
        reason: String,
    },

    #[error("{0} record has no string id")]
    MissingId(EntityKind),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True when the failure came from turning a value into (or out of) a column.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            StorageError::Json(_)
                | StorageError::Encode { .. }
                | StorageError::Decode { .. }
                | StorageError::MissingId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{kind} '{id}' does not exist upstream")]
    NotFound { kind: EntityKind, id: String },

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("dependency {kind} '{id}' could not be backfilled: {source}")]
    DependencyUnavailable {
        kind: EntityKind,
        id: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("upsert into {kind} failed: {source}")]
    UpsertFailed {
        kind: EntityKind,
        #[source]
        source: StorageError,
    },

    #[error("reconciling children of '{parent_id}' failed: {source}")]
    ReconcileFailed {
        parent_id: String,
        #[source]
        source: StorageError,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub(crate) fn upsert(kind: EntityKind, err: StorageError) -> Self {
        if err.is_serialization() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::UpsertFailed { kind, source: err }
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        SyncError::Serialization(value.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
