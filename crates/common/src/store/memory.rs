use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use super::{sort_log, DocumentStore, PublicKeyRecord, StoreError, Subscription};
use crate::envelope::{Envelope, EnvelopeBatch};

/// In-memory document store
///
/// Cheap to clone; clones share the same collections, so several simulated
/// clients can talk through one instance.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
    /// Bumped on every append, drives subscriptions
    log_version: Arc<watch::Sender<u64>>,
    record_writes: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    records: HashMap<String, PublicKeyRecord>,
    messages: Vec<Envelope>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

impl MemoryStore {
    pub fn new() -> Self {
        let (log_version, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(MemoryStoreInner::default())),
            log_version: Arc::new(log_version),
            record_writes: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of directory writes served so far
    pub fn record_writes(&self) -> usize {
        self.record_writes.load(Ordering::SeqCst)
    }

    /// Simulate an outage: every call fails with `Unavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remove a directory record. Only tests and operators do this; the
    /// core never deletes records.
    pub fn remove_record(&self, uid: &str) -> Option<PublicKeyRecord> {
        self.inner.write().records.remove(uid)
    }

    fn check_available(&self) -> Result<(), StoreError<MemoryStoreError>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self) -> EnvelopeBatch {
        let mut batch = self.inner.read().messages.clone();
        sort_log(&mut batch);
        batch
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn get_record(
        &self,
        uid: &str,
    ) -> Result<Option<PublicKeyRecord>, StoreError<Self::Error>> {
        self.check_available()?;
        Ok(self.inner.read().records.get(uid).cloned())
    }

    async fn put_record(&self, record: PublicKeyRecord) -> Result<(), StoreError<Self::Error>> {
        self.check_available()?;
        if record.identity.is_empty() {
            return Err(StoreError::InvalidKey(record.identity));
        }
        self.inner
            .write()
            .records
            .insert(record.identity.clone(), record);
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<PublicKeyRecord>, StoreError<Self::Error>> {
        self.check_available()?;
        let mut records: Vec<_> = self.inner.read().records.values().cloned().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    async fn append_message(&self, envelope: Envelope) -> Result<(), StoreError<Self::Error>> {
        self.check_available()?;
        {
            let mut inner = self.inner.write();
            if inner.messages.iter().any(|m| m.id == envelope.id) {
                return Err(StoreError::Provider(MemoryStoreError::Internal(format!(
                    "duplicate message id {}",
                    envelope.id
                ))));
            }
            inner.messages.push(envelope);
        }
        self.log_version.send_modify(|v| *v += 1);
        Ok(())
    }

    async fn messages(&self) -> Result<EnvelopeBatch, StoreError<Self::Error>> {
        self.check_available()?;
        Ok(self.snapshot())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError<Self::Error>> {
        self.check_available()?;
        let (subscription, mut sink) = Subscription::channel();
        let mut version = self.log_version.subscribe();
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                let _ = version.borrow_and_update();
                if !sink.publish(store.snapshot()) {
                    break;
                }
                tokio::select! {
                    changed = version.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = sink.cancelled() => break,
                }
            }
            tracing::trace!("memory store subscription closed");
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::Identity;
    use crate::crypto::PublicJwk;

    fn record(uid: &str) -> PublicKeyRecord {
        PublicKeyRecord {
            identity: uid.to_string(),
            public_key: PublicJwk {
                kty: "RSA".to_string(),
                alg: None,
                key_ops: Vec::new(),
                ext: true,
                n: "AQAB".to_string(),
                e: "AQAB".to_string(),
            },
            label: format!("{}@example.com", uid),
        }
    }

    #[tokio::test]
    async fn test_records_last_write_wins() {
        let store = MemoryStore::new();
        store.put_record(record("alice")).await.unwrap();
        let mut updated = record("alice");
        updated.label = "renamed".to_string();
        store.put_record(updated.clone()).await.unwrap();

        assert_eq!(store.get_record("alice").await.unwrap(), Some(updated));
        assert_eq!(store.list_records().await.unwrap().len(), 1);
        assert_eq!(store.record_writes(), 2);
        assert!(store.get_record("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_ordered_by_creation_time() {
        let store = MemoryStore::new();
        let alice = Identity::new("alice", "alice@example.com");

        let mut late = Envelope::plain(&alice, "late");
        late.created_at = Utc::now() + Duration::seconds(5);
        let early = Envelope::plain(&alice, "early");

        store.append_message(late).await.unwrap();
        store.append_message(early).await.unwrap();

        let texts: Vec<_> = store
            .messages()
            .await
            .unwrap()
            .into_iter()
            .map(|e| match e.body {
                crate::envelope::Body::Plain { text } => text,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_records().await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.list_records().await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_receives_appends() {
        let store = MemoryStore::new();
        let alice = Identity::new("alice", "alice@example.com");
        let mut subscription = store.subscribe().await.unwrap();

        assert!(subscription.next().await.unwrap().is_empty());

        store
            .append_message(Envelope::plain(&alice, "hi"))
            .await
            .unwrap();
        assert_eq!(subscription.next().await.unwrap().len(), 1);

        subscription.cancel();
        assert!(subscription.next().await.is_none());
    }
}
