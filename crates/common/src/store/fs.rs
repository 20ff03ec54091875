use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

use super::{sort_log, valid_document_key, DocumentStore, PublicKeyRecord, StoreError, Subscription};
use crate::envelope::{Envelope, EnvelopeBatch, EnvelopeError};

const DIRECTORY_DIR_NAME: &str = "directory";
const MESSAGES_DIR_NAME: &str = "messages";

/// Default interval between polls of the message directory
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Document store backed by a shared directory of JSON files
///
/// ```text
/// <root>/directory/<uid>.json
/// <root>/messages/<created_at_micros>-<id>.json
/// ```
///
/// Several profiles pointing at the same root behave like clients of one
/// hosted store. Subscriptions poll the message directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    poll_interval: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum FsStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError<FsStoreError>> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(DIRECTORY_DIR_NAME))
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", root.display(), e)))?;
        fs::create_dir_all(root.join(MESSAGES_DIR_NAME))
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, uid: &str) -> Result<PathBuf, StoreError<FsStoreError>> {
        if !valid_document_key(uid) {
            return Err(StoreError::InvalidKey(uid.to_string()));
        }
        Ok(self
            .root
            .join(DIRECTORY_DIR_NAME)
            .join(format!("{}.json", uid)))
    }

    async fn read_messages(root: &Path) -> Result<EnvelopeBatch, StoreError<FsStoreError>> {
        let dir = root.join(MESSAGES_DIR_NAME);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let mut named = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(FsStoreError::from)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                // raced with a writer's rename
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(FsStoreError::from(e).into()),
            };
            match Envelope::from_json(&raw) {
                Ok(envelope) => named.push((entry.file_name(), envelope)),
                Err(e) => tracing::warn!("skipping malformed message {}: {}", path.display(), e),
            }
        }

        // file names start with the zero-padded creation time
        named.sort_by(|a, b| a.0.cmp(&b.0));
        let mut batch: EnvelopeBatch = named.into_iter().map(|(_, envelope)| envelope).collect();
        sort_log(&mut batch);
        Ok(batch)
    }

    async fn write_atomic(path: &Path, contents: String) -> Result<(), StoreError<FsStoreError>> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents).await.map_err(FsStoreError::from)?;
        fs::rename(&tmp, path).await.map_err(FsStoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    type Error = FsStoreError;

    async fn get_record(
        &self,
        uid: &str,
    ) -> Result<Option<PublicKeyRecord>, StoreError<Self::Error>> {
        let path = self.record_path(uid)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(FsStoreError::from)?,
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsStoreError::from(e).into()),
        }
    }

    async fn put_record(&self, record: PublicKeyRecord) -> Result<(), StoreError<Self::Error>> {
        let path = self.record_path(&record.identity)?;
        let json = serde_json::to_string_pretty(&record).map_err(FsStoreError::from)?;
        Self::write_atomic(&path, json).await
    }

    async fn list_records(&self) -> Result<Vec<PublicKeyRecord>, StoreError<Self::Error>> {
        let dir = self.root.join(DIRECTORY_DIR_NAME);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(FsStoreError::from)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await.map_err(FsStoreError::from)?;
            match serde_json::from_str::<PublicKeyRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping malformed record {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    async fn append_message(&self, envelope: Envelope) -> Result<(), StoreError<Self::Error>> {
        let micros = envelope.created_at.timestamp_micros().max(0);
        let path = self
            .root
            .join(MESSAGES_DIR_NAME)
            .join(format!("{:020}-{}.json", micros, envelope.id));
        if fs::try_exists(&path).await.map_err(FsStoreError::from)? {
            return Err(StoreError::InvalidKey(envelope.id.to_string()));
        }
        let json = envelope.to_json().map_err(FsStoreError::from)?;
        Self::write_atomic(&path, json).await
    }

    async fn messages(&self) -> Result<EnvelopeBatch, StoreError<Self::Error>> {
        Self::read_messages(&self.root).await
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError<Self::Error>> {
        let initial = Self::read_messages(&self.root).await?;
        let (subscription, mut sink) = Subscription::channel();
        let root = self.root.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last = initial;
            if !sink.publish(last.clone()) {
                return;
            }
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = sink.cancelled() => break,
                }
                match Self::read_messages(&root).await {
                    Ok(batch) if batch != last => {
                        last = batch;
                        if !sink.publish(last.clone()) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("message log poll failed: {}", e),
                }
            }
            tracing::trace!("fs store subscription closed");
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::auth::Identity;
    use crate::crypto::PublicJwk;
    use crate::envelope::Body;

    fn record(uid: &str) -> PublicKeyRecord {
        PublicKeyRecord {
            identity: uid.to_string(),
            public_key: PublicJwk {
                kty: "RSA".to_string(),
                alg: Some("RSA-OAEP-256".to_string()),
                key_ops: vec!["encrypt".to_string()],
                ext: true,
                n: "AQAB".to_string(),
                e: "AQAB".to_string(),
            },
            label: format!("{}@example.com", uid),
        }
    }

    #[tokio::test]
    async fn test_records_persist() {
        let temp = TempDir::new().unwrap();
        let store = FsStore::open(temp.path()).await.unwrap();
        store.put_record(record("alice")).await.unwrap();
        store.put_record(record("bob")).await.unwrap();

        let reopened = FsStore::open(temp.path()).await.unwrap();
        assert_eq!(
            reopened.get_record("alice").await.unwrap(),
            Some(record("alice"))
        );
        let uids: Vec<_> = reopened
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(uids, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_invalid_uid_rejected() {
        let temp = TempDir::new().unwrap();
        let store = FsStore::open(temp.path()).await.unwrap();
        assert!(matches!(
            store.get_record("../etc/passwd").await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_messages_roundtrip_in_order() {
        let temp = TempDir::new().unwrap();
        let store = FsStore::open(temp.path()).await.unwrap();
        let alice = Identity::new("alice", "alice@example.com");

        let first = Envelope::plain(&alice, "first");
        let mut second = Envelope::plain(&alice, "second");
        second.created_at = first.created_at + chrono::Duration::milliseconds(1);

        store.append_message(second.clone()).await.unwrap();
        store.append_message(first.clone()).await.unwrap();

        let batch = store.messages().await.unwrap();
        assert_eq!(batch, vec![first.clone(), second]);
        assert!(store.append_message(first).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_message_skipped() {
        let temp = TempDir::new().unwrap();
        let store = FsStore::open(temp.path()).await.unwrap();
        let alice = Identity::new("alice", "alice@example.com");
        store
            .append_message(Envelope::plain(&alice, "ok"))
            .await
            .unwrap();
        std::fs::write(temp.path().join("messages").join("0-bad.json"), "{").unwrap();

        let batch = store.messages().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, Body::Plain { text: "ok".to_string() });
    }

    #[tokio::test]
    async fn test_subscription_polls_changes() {
        let temp = TempDir::new().unwrap();
        let store = FsStore::open(temp.path())
            .await
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let alice = Identity::new("alice", "alice@example.com");

        let mut subscription = store.subscribe().await.unwrap();
        assert!(subscription.next().await.unwrap().is_empty());

        store
            .append_message(Envelope::plain(&alice, "hi"))
            .await
            .unwrap();
        let batch = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
    }
}
