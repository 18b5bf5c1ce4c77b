use serde::Deserialize;
use std::path::PathBuf;

use crate::errors::{Result, StorageError};

pub const DEFAULT_SCHEMA: &str = "stripe";

/// Settings for the local mirror. Built once at startup and handed to
/// [`crate::store::SqliteStore::open`]; nothing reads it from a global.
#[derive(Deserialize, Debug, Clone)]
pub struct SyncConfig {
    /// Database file attached under `schema`. `None` keeps everything in memory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl SyncConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(database_path.into()),
            schema: default_schema(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            schema: default_schema(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Rejects schema names that cannot be used as a bare SQL identifier.
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.schema.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid {
            return Err(StorageError::Config(format!(
                "invalid schema name '{}'",
                self.schema
            )));
        }
        if self.schema.eq_ignore_ascii_case("main") || self.schema.eq_ignore_ascii_case("temp") {
            return Err(StorageError::Config(format!(
                "schema name '{}' is reserved by SQLite",
                self.schema
            )));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
