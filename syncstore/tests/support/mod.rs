pub mod fixture;
pub mod payloads;
pub mod recording;

use std::sync::Arc;

use syncstore::{
    config::SyncConfig,
    store::{EntityStore, SqliteStore},
    sync::SyncEngine,
};

use self::fixture::FixtureFetcher;
use self::recording::RecordingStore;

#[allow(dead_code)]
pub struct TestContext {
    pub sqlite: Arc<SqliteStore>,
    pub store: Arc<RecordingStore>,
    pub fetcher: Arc<FixtureFetcher>,
    pub engine: SyncEngine,
}

pub fn init_test_context() -> anyhow::Result<TestContext> {
    let _ = env_logger::builder().is_test(true).try_init();

    let sqlite = Arc::new(SqliteStore::open(&SyncConfig::in_memory())?);
    sqlite.initialize_schema()?;

    let store = Arc::new(RecordingStore::new(Arc::clone(&sqlite)));
    let fetcher = Arc::new(FixtureFetcher::new());

    let entity_store: Arc<dyn EntityStore> = store.clone();
    let engine = SyncEngine::new(entity_store, fetcher.clone());

    Ok(TestContext {
        sqlite,
        store,
        fetcher,
        engine,
    })
}
