//! Store decorator that logs the order of writes and can inject failures.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use syncstore::errors::{Result, StorageError};
use syncstore::schema::{ChildCollection, EntityKind, Record};
use syncstore::store::{EntityStore, SqliteStore};

pub struct RecordingStore {
    inner: Arc<SqliteStore>,
    writes: Mutex<Vec<(EntityKind, Vec<String>)>>,
    failing_upserts: Mutex<HashSet<EntityKind>>,
    failing_reconcile: Mutex<bool>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            failing_upserts: Mutex::new(HashSet::new()),
            failing_reconcile: Mutex::new(false),
        }
    }

    /// Kinds written, in order, one entry per non-empty upsert.
    pub fn write_order(&self) -> Vec<EntityKind> {
        self.writes.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn writes(&self) -> Vec<(EntityKind, Vec<String>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_upserts_of(&self, kind: EntityKind) {
        self.failing_upserts.lock().unwrap().insert(kind);
    }

    pub fn set_reconcile_failure(&self, failing: bool) {
        *self.failing_reconcile.lock().unwrap() = failing;
    }
}

#[async_trait]
impl EntityStore for RecordingStore {
    async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        self.inner.exists(kind, id).await
    }

    async fn find_missing(&self, kind: EntityKind, ids: &[String]) -> Result<Vec<String>> {
        self.inner.find_missing(kind, ids).await
    }

    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        self.inner.get(kind, id).await
    }

    async fn upsert(&self, kind: EntityKind, records: &[Record]) -> Result<Vec<Record>> {
        if records.is_empty() {
            return self.inner.upsert(kind, records).await;
        }
        if self.failing_upserts.lock().unwrap().contains(&kind) {
            return Err(StorageError::Config(format!("injected upsert failure for {kind}")));
        }
        let stored = self.inner.upsert(kind, records).await?;
        let ids = records
            .iter()
            .filter_map(|record| record.get("id").and_then(|id| id.as_str()))
            .map(str::to_string)
            .collect();
        self.writes.lock().unwrap().push((kind, ids));
        Ok(stored)
    }

    async fn mark_children_deleted(
        &self,
        child: &ChildCollection,
        parent_id: &str,
        kept_ids: &[String],
    ) -> Result<usize> {
        if *self.failing_reconcile.lock().unwrap() {
            return Err(StorageError::Config("injected reconcile failure".into()));
        }
        self.inner
            .mark_children_deleted(child, parent_id, kept_ids)
            .await
    }
}
