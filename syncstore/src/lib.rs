pub mod config;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod schema;
pub mod sql;
pub mod store;
pub mod sync;

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::errors::Result;
use crate::fetch::RemoteFetcher;
use crate::store::{EntityStore, SqliteStore};
use crate::sync::SyncEngine;

pub use crate::schema::{EntityKind, Record};

/// The main entry point for the `syncstore` library.
///
/// `SyncStore` wires the local mirror of the payment provider's objects:
/// - A SQLite database (`SqliteStore`) with one table per entity kind inside
///   the configured schema.
/// - A sync engine (`SyncEngine`) that backfills missing references through a
///   [`RemoteFetcher`], upserts batches, and reconciles owned children.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use syncstore::{SyncStore, config::SyncConfig, fetch::RemoteFetcher};
///
/// async fn run(fetcher: Arc<dyn RemoteFetcher>) -> syncstore::errors::Result<()> {
///     let store = SyncStore::new(SyncConfig::new("mirror.sqlite"), fetcher)?;
///     let exists = store
///         .engine
///         .exists_by_id(syncstore::EntityKind::Customer, "cus_123")
///         .await;
///     println!("{exists:?}");
///     Ok(())
/// }
/// ```
pub struct SyncStore {
    pub config: SyncConfig,
    pub store: Arc<SqliteStore>,
    pub engine: Arc<SyncEngine>,
}

impl SyncStore {
    /// Opens the database, creates missing tables, and builds the engine.
    pub fn new(config: SyncConfig, fetcher: Arc<dyn RemoteFetcher>) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config)?);
        store.initialize_schema()?;

        let entity_store: Arc<dyn EntityStore> = store.clone();
        let engine = Arc::new(SyncEngine::new(entity_store, fetcher));

        Ok(Self {
            config,
            store,
            engine,
        })
    }
}
