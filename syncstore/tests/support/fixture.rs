//! A fetcher that serves canned provider objects and records every call, so
//! tests can assert how many remote fetches a sync performed and in which
//! order. Individual ids can be made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use syncstore::errors::FetchError;
use syncstore::fetch::RemoteFetcher;
use syncstore::schema::{EntityKind, Record};

#[derive(Default)]
pub struct FixtureFetcher {
    entities: Mutex<HashMap<(EntityKind, String), Record>>,
    failing: Mutex<HashSet<(EntityKind, String)>>,
    calls: Mutex<Vec<(EntityKind, String)>>,
}

#[allow(dead_code)]
impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider object; its `id` field is the lookup key.
    pub fn register(&self, kind: EntityKind, object: JsonValue) {
        let record = object
            .as_object()
            .cloned()
            .expect("fixture objects must be JSON objects");
        let id = record["id"]
            .as_str()
            .expect("fixture objects need an id")
            .to_string();
        self.entities.lock().unwrap().insert((kind, id), record);
    }

    pub fn fail(&self, kind: EntityKind, id: &str) {
        self.failing.lock().unwrap().insert((kind, id.to_string()));
    }

    pub fn calls(&self) -> Vec<(EntityKind, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, kind: EntityKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| *called == kind)
            .count()
    }
}

#[async_trait]
impl RemoteFetcher for FixtureFetcher {
    fn name(&self) -> &'static str {
        "fixture_fetcher"
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Record, FetchError> {
        self.calls.lock().unwrap().push((kind, id.to_string()));
        if self.failing.lock().unwrap().contains(&(kind, id.to_string())) {
            return Err(FetchError::Unavailable(format!("injected failure for {id}")));
        }
        self.entities
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                kind,
                id: id.to_string(),
            })
    }
}
