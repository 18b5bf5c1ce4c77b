use async_trait::async_trait;

use crate::errors::FetchError;
use crate::schema::{EntityKind, Record};

/// Source of truth for entities that are missing locally.
///
/// Implementations do not retry; a failure aborts the sync call that asked
/// for the entity.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Retrieves the current representation of `kind` / `id`.
    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Record, FetchError>;
}
