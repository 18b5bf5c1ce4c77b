use async_trait::async_trait;
use syncstore::errors::FetchError;
use syncstore::fetch::RemoteFetcher;
use syncstore::{EntityKind, Record};

use crate::client::StripeClient;
use crate::error::ClientError;

#[async_trait]
impl RemoteFetcher for StripeClient {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Record, FetchError> {
        self.retrieve(kind, id).await.map_err(|err| {
            log::warn!("fetching {} '{}' failed: {}", kind, id, err);
            to_fetch_error(kind, id, err)
        })
    }
}

/// A malformed id can never exist upstream; everything else may succeed later.
pub(crate) fn to_fetch_error(kind: EntityKind, id: &str, err: ClientError) -> FetchError {
    match err {
        ClientError::NotFound(_) | ClientError::InvalidParam(_) => FetchError::NotFound {
            kind,
            id: id.to_string(),
        },
        other => FetchError::Unavailable(other.to_string()),
    }
}
