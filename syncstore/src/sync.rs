//! Entity synchronization: dependency backfill, batch upsert and child
//! reconciliation, sequenced per call as
//! `backfill dependencies -> upsert batch -> [reconcile children] -> done`.
//!
//! Any collaborator failure aborts the call at the step it happened in. The
//! steps are strictly ordered, so a failed backfill never leaves a dependent
//! row behind.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::errors::{SyncError, SyncResult};
use crate::fetch::RemoteFetcher;
use crate::models::{Customer, Invoice, Subscription, SubscriptionItem, SubscriptionSchedule, SyncEntity};
use crate::schema::{ChildCollection, EntityKind, Record, record_id, reference_id};
use crate::store::EntityStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of [`SyncEngine::backfill_by_ids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub kind: EntityKind,
    pub requested: usize,
    /// Ids that had no local row and were fetched.
    pub missing: Vec<String>,
    pub synced: usize,
}

/// Children carried by one parent in the snapshot being synced.
#[derive(Debug)]
struct ChildSnapshot {
    parent_id: String,
    items: Vec<Record>,
    /// False when the provider paginated the list; absence then proves nothing.
    complete: bool,
}

pub struct SyncEngine {
    store: Arc<dyn EntityStore>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn EntityStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn exists_by_id(&self, kind: EntityKind, id: &str) -> SyncResult<bool> {
        Ok(self.store.exists(kind, id).await?)
    }

    pub async fn find_missing(&self, kind: EntityKind, ids: &[String]) -> SyncResult<Vec<String>> {
        Ok(self.store.find_missing(kind, ids).await?)
    }

    /// Writes `records` of one kind and returns the stored rows in input order.
    ///
    /// With `backfill_related`, every distinct referenced id that is missing
    /// locally is fetched and synced first, once per id across the batch.
    /// Kinds owning a child collection then upsert all children and mark
    /// stored children absent from each parent's snapshot as deleted.
    pub async fn sync_batch(
        &self,
        kind: EntityKind,
        records: Vec<Record>,
        backfill_related: bool,
    ) -> SyncResult<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        if backfill_related {
            self.backfill_references(kind, &records).await?;
        }

        let stored = self
            .store
            .upsert(kind, &records)
            .await
            .map_err(|err| SyncError::upsert(kind, err))?;

        if let Some(child) = kind.child_collection() {
            self.sync_children(kind, child, &records).await?;
        }

        log::info!("synced {} {} records", stored.len(), kind);
        Ok(stored)
    }

    /// Fetches every id of `kind` with no local row and syncs them as one batch.
    pub async fn backfill_by_ids(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> SyncResult<BackfillReport> {
        let missing = self.store.find_missing(kind, ids).await?;

        let mut fetched = Vec::with_capacity(missing.len());
        for id in &missing {
            log::debug!("fetching {} '{}' from {}", kind, id, self.fetcher.name());
            fetched.push(self.fetcher.fetch(kind, id).await?);
        }
        let stored = self.sync_batch(kind, fetched, true).await?;

        Ok(BackfillReport {
            kind,
            requested: ids.len(),
            missing,
            synced: stored.len(),
        })
    }

    /// Fetches one entity and syncs it, dependencies included.
    pub fn fetch_and_insert<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a str,
    ) -> BoxFuture<'a, SyncResult<Vec<Record>>> {
        Box::pin(async move {
            log::debug!("fetching {} '{}' from {}", kind, id, self.fetcher.name());
            let entity = self.fetcher.fetch(kind, id).await?;
            self.sync_batch(kind, vec![entity], true).await
        })
    }

    /// Marks stored children of `parent_id` that are not in `child_ids` as
    /// deleted. Idempotent; returns how many rows were newly marked.
    pub async fn reconcile_children(
        &self,
        parent_kind: EntityKind,
        parent_id: &str,
        child_ids: &[String],
    ) -> SyncResult<usize> {
        let child = parent_kind.child_collection().ok_or_else(|| {
            SyncError::InvalidArg(format!("{parent_kind} does not own a child collection"))
        })?;
        self.store
            .mark_children_deleted(child, parent_id, child_ids)
            .await
            .map_err(|source| SyncError::ReconcileFailed {
                parent_id: parent_id.to_string(),
                source,
            })
    }

    async fn backfill_references(&self, kind: EntityKind, records: &[Record]) -> SyncResult<()> {
        for reference in kind.references() {
            let mut seen = HashSet::new();
            let ids: Vec<String> = records
                .iter()
                .filter_map(|record| reference_id(record, reference.field))
                .filter(|id| seen.insert(id.clone()))
                .collect();
            if ids.is_empty() {
                continue;
            }

            let missing = self.store.find_missing(reference.kind, &ids).await?;
            if missing.is_empty() {
                continue;
            }
            log::info!(
                "backfilling {} missing {} referenced by {}",
                missing.len(),
                reference.kind,
                kind
            );

            for id in missing {
                let result = self.fetch_and_insert(reference.kind, &id).await;
                if let Err(source) = result {
                    log::warn!("backfill of {} '{}' failed: {}", reference.kind, id, source);
                    return Err(SyncError::DependencyUnavailable {
                        kind: reference.kind,
                        id,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }

    /// Children are written after their parents, so their only reference is
    /// already satisfied and no backfill runs for them.
    async fn sync_children(
        &self,
        parent_kind: EntityKind,
        child: &ChildCollection,
        parents: &[Record],
    ) -> SyncResult<()> {
        let mut snapshots = Vec::with_capacity(parents.len());
        for parent in parents {
            if let Some(snapshot) = child_snapshot(parent_kind, child, parent)? {
                snapshots.push(snapshot);
            }
        }

        let children: Vec<Record> = snapshots
            .iter()
            .flat_map(|snapshot| snapshot.items.iter().cloned())
            .collect();
        self.store
            .upsert(child.kind, &children)
            .await
            .map_err(|err| SyncError::upsert(child.kind, err))?;

        for snapshot in &snapshots {
            if !snapshot.complete {
                log::warn!(
                    "{} of {} '{}' is paginated; skipping deletion of absent children",
                    child.list_field,
                    parent_kind,
                    snapshot.parent_id
                );
                continue;
            }
            let kept = snapshot
                .items
                .iter()
                .map(|item| record_id(child.kind, item).map(str::to_string))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| SyncError::Serialization(err.to_string()))?;
            self.reconcile_children(parent_kind, &snapshot.parent_id, &kept)
                .await?;
        }
        Ok(())
    }

    pub async fn sync_entities<T: SyncEntity>(
        &self,
        entities: &[T],
        backfill_related: bool,
    ) -> SyncResult<Vec<T>> {
        let records = entities
            .iter()
            .map(SyncEntity::to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let stored = self.sync_batch(T::KIND, records, backfill_related).await?;
        let typed = stored
            .into_iter()
            .map(T::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(typed)
    }

    pub async fn upsert_customers(&self, customers: &[Customer]) -> SyncResult<Vec<Customer>> {
        self.sync_entities(customers, true).await
    }

    pub async fn upsert_subscriptions(
        &self,
        subscriptions: &[Subscription],
        backfill_related: bool,
    ) -> SyncResult<Vec<Subscription>> {
        self.sync_entities(subscriptions, backfill_related).await
    }

    pub async fn upsert_subscription_schedules(
        &self,
        schedules: &[SubscriptionSchedule],
        backfill_related: bool,
    ) -> SyncResult<Vec<SubscriptionSchedule>> {
        self.sync_entities(schedules, backfill_related).await
    }

    pub async fn upsert_invoices(
        &self,
        invoices: &[Invoice],
        backfill_related: bool,
    ) -> SyncResult<Vec<Invoice>> {
        self.sync_entities(invoices, backfill_related).await
    }

    pub async fn upsert_subscription_items(
        &self,
        items: &[SubscriptionItem],
        backfill_related: bool,
    ) -> SyncResult<Vec<SubscriptionItem>> {
        self.sync_entities(items, backfill_related).await
    }
}

/// Extracts the owned children from a parent record. A parent without the
/// list field carries no snapshot and is left unreconciled.
fn child_snapshot(
    parent_kind: EntityKind,
    child: &ChildCollection,
    parent: &Record,
) -> SyncResult<Option<ChildSnapshot>> {
    let list = match parent.get(child.list_field) {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(list) => list,
    };
    let parent_id = record_id(parent_kind, parent)
        .map_err(|err| SyncError::Serialization(err.to_string()))?;
    let data = list
        .get("data")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| {
            SyncError::Serialization(format!(
                "{parent_kind}.{} of '{parent_id}' is not a list object",
                child.list_field
            ))
        })?;

    let mut items = Vec::with_capacity(data.len());
    for entry in data {
        let mut item = entry.as_object().cloned().ok_or_else(|| {
            SyncError::Serialization(format!(
                "{} entry of '{parent_id}' is not an object",
                child.kind
            ))
        })?;
        // the snapshot decides ownership
        item.insert(
            child.parent_field.to_string(),
            JsonValue::String(parent_id.to_string()),
        );
        items.push(item);
    }

    let complete = !list
        .get("has_more")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    Ok(Some(ChildSnapshot {
        parent_id: parent_id.to_string(),
        items,
        complete,
    }))
}
