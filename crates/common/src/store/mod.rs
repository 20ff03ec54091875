//! Shared document store boundary
//!
//! The store holds two collections: the public-key directory (one
//! [`PublicKeyRecord`] per identity, last write wins) and the append-only
//! message log ordered by creation time. Both are owned by an external
//! service; this module only describes the contract the core relies on.

mod fs;
mod memory;
mod subscription;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicJwk;
use crate::envelope::{Envelope, EnvelopeBatch};

pub use fs::{FsStore, FsStoreError};
pub use memory::{MemoryStore, MemoryStoreError};
pub use subscription::{Subscription, SubscriptionSink};

/// A published directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    /// Uid of the identity owning this key
    pub identity: String,
    pub public_key: PublicJwk,
    pub label: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError<T> {
    #[error("unhandled store provider error: {0}")]
    Provider(#[from] T),
    /// The store could not be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid document key {0:?}")]
    InvalidKey(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the directory record for an identity
    async fn get_record(&self, uid: &str)
        -> Result<Option<PublicKeyRecord>, StoreError<Self::Error>>;

    /// Create or update the record keyed by `record.identity`
    async fn put_record(&self, record: PublicKeyRecord) -> Result<(), StoreError<Self::Error>>;

    /// Every record in the directory
    async fn list_records(&self) -> Result<Vec<PublicKeyRecord>, StoreError<Self::Error>>;

    /// Append a message to the log
    async fn append_message(&self, envelope: Envelope) -> Result<(), StoreError<Self::Error>>;

    /// The message log ordered by `created_at` ascending
    async fn messages(&self) -> Result<EnvelopeBatch, StoreError<Self::Error>>;

    /// Push-based view of the message log
    ///
    /// The subscription yields a full ordered snapshot immediately and again
    /// on every change. It ends when cancelled or dropped; calling
    /// `subscribe` again starts a fresh one.
    async fn subscribe(&self) -> Result<Subscription, StoreError<Self::Error>>;
}

/// Document keys become file names and paths in some stores
pub(crate) fn valid_document_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@'))
}

/// Stable sort by creation time; equal timestamps keep insertion order
pub(crate) fn sort_log(batch: &mut EnvelopeBatch) {
    batch.sort_by_key(|envelope| envelope.created_at);
}
