//! Per-identity key material
//!
//! The key store owns the local private key, a cached copy of its public half
//! and the identity's record in the shared directory. [`KeyStore::ensure_key_material`]
//! is run once per signed-in session and converges all three.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::crypto::{
    import_private_key, DecryptKey, KeyError, KeyPair, PrivateJwk, PublicJwk,
    DEFAULT_MODULUS_BITS,
};
use crate::local::{LocalStore, LocalStoreError};
use crate::store::{DocumentStore, PublicKeyRecord, StoreError};

const PRIVATE_KEY_PREFIX: &str = "cipherchat.privateKey.";
const PUBLIC_KEY_PREFIX: &str = "cipherchat.publicKey.";

/// Local storage key holding the private JWK of `uid`
pub fn private_key_name(uid: &str) -> String {
    format!("{}{}", PRIVATE_KEY_PREFIX, uid)
}

/// Local storage key holding the cached public JWK of `uid`
pub fn public_key_name(uid: &str) -> String {
    format!("{}{}", PUBLIC_KEY_PREFIX, uid)
}

/// What to do when local key material cannot be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesyncPolicy {
    /// Replace the pair. Messages encrypted to the old key stay unreadable.
    #[default]
    Regenerate,
    /// Refuse and leave local state untouched
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreConfig {
    #[serde(default = "default_modulus_bits")]
    pub modulus_bits: usize,
    #[serde(default)]
    pub desync_policy: DesyncPolicy,
}

fn default_modulus_bits() -> usize {
    DEFAULT_MODULUS_BITS
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            modulus_bits: default_modulus_bits(),
            desync_policy: DesyncPolicy::default(),
        }
    }
}

/// Outcome of [`KeyStore::ensure_key_material`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMaterialReport {
    /// First run for this identity on this device
    Generated,
    /// Everything was already in place; nothing was written
    Existing,
    /// Local keys were fine but the directory record was absent or stale
    Republished,
    /// Local keys were unusable and have been replaced
    Regenerated { previous_unreadable: bool },
}

impl std::fmt::Display for KeyMaterialReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterialReport::Generated => write!(f, "generated a new key pair"),
            KeyMaterialReport::Existing => write!(f, "key pair already in place"),
            KeyMaterialReport::Republished => write!(f, "republished public key"),
            KeyMaterialReport::Regenerated { previous_unreadable } => {
                write!(f, "regenerated key pair")?;
                if *previous_unreadable {
                    write!(f, " (older messages may no longer be readable)")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("key generation failed: {0}")]
    KeyGeneration(KeyError),
    #[error("local storage error: {0}")]
    Local(#[from] LocalStoreError),
    #[error("directory error: {0}")]
    Directory(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("local key material for {uid} is out of sync: {reason}")]
    Desynchronized { uid: String, reason: String },
    #[error("no private key stored for {0}")]
    MissingPrivateKey(String),
    #[error("stored private key is invalid: {0}")]
    InvalidPrivateKey(KeyError),
}

impl<T> From<StoreError<T>> for KeyStoreError
where
    T: std::error::Error + Send + Sync + 'static,
{
    fn from(e: StoreError<T>) -> Self {
        KeyStoreError::Directory(Box::new(e))
    }
}

/// Key lifecycle for identities signed in on this device
#[derive(Debug, Clone)]
pub struct KeyStore<S: DocumentStore> {
    store: S,
    local: Arc<dyn LocalStore>,
    config: KeyStoreConfig,
}

impl<S: DocumentStore> KeyStore<S> {
    pub fn new(store: S, local: Arc<dyn LocalStore>, config: KeyStoreConfig) -> Self {
        Self {
            store,
            local,
            config,
        }
    }

    /// Make sure `identity` has a usable key pair and a matching directory
    /// record
    ///
    /// Idempotent: on a device that already holds consistent material this
    /// performs no generation and no directory write. Every other path does
    /// exactly one directory write.
    pub async fn ensure_key_material(
        &self,
        identity: &Identity,
    ) -> Result<KeyMaterialReport, KeyStoreError> {
        let uid = identity.uid.as_str();

        let Some(raw_private) = self.local.get(&private_key_name(uid))? else {
            tracing::info!("no key pair for {}, generating", identity);
            self.install_new_pair(identity).await?;
            return Ok(KeyMaterialReport::Generated);
        };

        let pair = match PrivateJwk::from_json(&raw_private).and_then(|jwk| KeyPair::from_jwk(&jwk))
        {
            Ok(pair) => pair,
            Err(e) => {
                return self
                    .recover(identity, format!("stored private key is unusable: {}", e))
                    .await
            }
        };
        let derived = pair.public_jwk();

        let cached = self.local.get(&public_key_name(uid))?;
        let force_publish = match cached {
            None => {
                tracing::warn!(
                    "cached public key for {} is missing, deriving it from the private key",
                    identity
                );
                self.local.set(&public_key_name(uid), &derived.to_json())?;
                true
            }
            Some(raw) => match PublicJwk::from_json(&raw) {
                Ok(jwk) if same_key(&jwk, &derived) => false,
                Ok(_) => {
                    return self
                        .recover(identity, "cached public key does not match".to_string())
                        .await
                }
                Err(e) => {
                    return self
                        .recover(identity, format!("cached public key is unusable: {}", e))
                        .await
                }
            },
        };

        if !force_publish {
            let published = self.store.get_record(uid).await?;
            let current = published
                .map(|record| same_key(&record.public_key, &derived) && record.label == identity.label)
                .unwrap_or(false);
            if current {
                tracing::debug!("key material for {} is up to date", identity);
                return Ok(KeyMaterialReport::Existing);
            }
        }

        tracing::info!("republishing public key for {}", identity);
        self.publish(identity, derived).await?;
        Ok(KeyMaterialReport::Republished)
    }

    /// Load the decrypt handle for `identity`
    pub fn load_private_key(&self, identity: &Identity) -> Result<DecryptKey, KeyStoreError> {
        let raw = self
            .local
            .get(&private_key_name(&identity.uid))?
            .ok_or_else(|| KeyStoreError::MissingPrivateKey(identity.uid.clone()))?;
        let jwk = PrivateJwk::from_json(&raw).map_err(KeyStoreError::InvalidPrivateKey)?;
        import_private_key(&jwk).map_err(KeyStoreError::InvalidPrivateKey)
    }

    /// Load the full pair for export
    pub fn load_key_pair(&self, identity: &Identity) -> Result<KeyPair, KeyStoreError> {
        let raw = self
            .local
            .get(&private_key_name(&identity.uid))?
            .ok_or_else(|| KeyStoreError::MissingPrivateKey(identity.uid.clone()))?;
        let jwk = PrivateJwk::from_json(&raw).map_err(KeyStoreError::InvalidPrivateKey)?;
        KeyPair::from_jwk(&jwk).map_err(KeyStoreError::InvalidPrivateKey)
    }

    async fn recover(
        &self,
        identity: &Identity,
        reason: String,
    ) -> Result<KeyMaterialReport, KeyStoreError> {
        match self.config.desync_policy {
            DesyncPolicy::Fail => {
                tracing::error!("key material for {} is out of sync: {}", identity, reason);
                Err(KeyStoreError::Desynchronized {
                    uid: identity.uid.clone(),
                    reason,
                })
            }
            DesyncPolicy::Regenerate => {
                tracing::warn!(
                    "key material for {} is out of sync ({}), regenerating; messages sent to the old key will be unreadable",
                    identity,
                    reason
                );
                self.install_new_pair(identity).await?;
                Ok(KeyMaterialReport::Regenerated {
                    previous_unreadable: true,
                })
            }
        }
    }

    async fn install_new_pair(&self, identity: &Identity) -> Result<(), KeyStoreError> {
        let bits = self.config.modulus_bits;
        let pair = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
            .await
            .map_err(|e| KeyStoreError::KeyGeneration(KeyError::Generation(e.to_string())))?
            .map_err(KeyStoreError::KeyGeneration)?;

        let public = pair.public_jwk();
        self.local
            .set(&private_key_name(&identity.uid), &pair.private_jwk().to_json())?;
        self.local
            .set(&public_key_name(&identity.uid), &public.to_json())?;
        self.publish(identity, public).await
    }

    async fn publish(&self, identity: &Identity, public_key: PublicJwk) -> Result<(), KeyStoreError> {
        self.store
            .put_record(PublicKeyRecord {
                identity: identity.uid.clone(),
                public_key,
                label: identity.label.clone(),
            })
            .await?;
        Ok(())
    }
}

fn same_key(a: &PublicJwk, b: &PublicJwk) -> bool {
    a.kty == b.kty && a.n == b.n && a.e == b.e
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::local::MemoryLocalStore;
    use crate::store::MemoryStore;

    fn setup(policy: DesyncPolicy) -> (MemoryStore, Arc<MemoryLocalStore>, KeyStore<MemoryStore>) {
        let store = MemoryStore::new();
        let local = Arc::new(MemoryLocalStore::new());
        let keystore = KeyStore::new(
            store.clone(),
            local.clone(),
            KeyStoreConfig {
                desync_policy: policy,
                ..Default::default()
            },
        );
        (store, local, keystore)
    }

    fn alice() -> Identity {
        Identity::new("alice", "alice@example.com")
    }

    #[tokio::test]
    async fn test_first_run_generates_and_publishes() {
        let (store, local, keystore) = setup(DesyncPolicy::Regenerate);

        let report = keystore.ensure_key_material(&alice()).await.unwrap();
        assert_eq!(report, KeyMaterialReport::Generated);
        assert_eq!(store.record_writes(), 1);

        let record = store.get_record("alice").await.unwrap().unwrap();
        assert_eq!(record.label, "alice@example.com");
        let cached = PublicJwk::from_json(&local.get(&public_key_name("alice")).unwrap().unwrap())
            .unwrap();
        assert_eq!(cached, record.public_key);
        assert!(keystore.load_private_key(&alice()).is_ok());
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let (store, _local, keystore) = setup(DesyncPolicy::Regenerate);
        keystore.ensure_key_material(&alice()).await.unwrap();
        let before = store.get_record("alice").await.unwrap();

        let report = keystore.ensure_key_material(&alice()).await.unwrap();
        assert_eq!(report, KeyMaterialReport::Existing);
        assert_eq!(store.record_writes(), 1);
        assert_eq!(store.get_record("alice").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_record_is_republished() {
        let (store, _local, keystore) = setup(DesyncPolicy::Regenerate);
        keystore.ensure_key_material(&alice()).await.unwrap();
        let before = store.remove_record("alice").unwrap();

        let report = keystore.ensure_key_material(&alice()).await.unwrap();
        assert_eq!(report, KeyMaterialReport::Republished);
        assert_eq!(store.record_writes(), 2);
        assert_eq!(store.get_record("alice").await.unwrap(), Some(before));
    }

    #[tokio::test]
    async fn test_missing_cached_public_key_is_derived() {
        let (store, local, keystore) = setup(DesyncPolicy::Fail);
        keystore.ensure_key_material(&alice()).await.unwrap();
        let published = store.get_record("alice").await.unwrap().unwrap();
        local.remove(&public_key_name("alice")).unwrap();

        let report = keystore.ensure_key_material(&alice()).await.unwrap();
        assert_eq!(report, KeyMaterialReport::Republished);
        assert_eq!(store.record_writes(), 2);
        assert_eq!(
            store.get_record("alice").await.unwrap().unwrap().public_key,
            published.public_key
        );
        assert!(local.get(&public_key_name("alice")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_private_key_regenerates() {
        let (store, local, keystore) = setup(DesyncPolicy::Regenerate);
        keystore.ensure_key_material(&alice()).await.unwrap();
        let old = store.get_record("alice").await.unwrap().unwrap();
        local.set(&private_key_name("alice"), "not a key").unwrap();

        let report = keystore.ensure_key_material(&alice()).await.unwrap();
        assert_eq!(
            report,
            KeyMaterialReport::Regenerated {
                previous_unreadable: true
            }
        );
        let new = store.get_record("alice").await.unwrap().unwrap();
        assert_ne!(new.public_key.n, old.public_key.n);
        assert_eq!(store.record_writes(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_private_key_fails_under_fail_policy() {
        let (store, local, keystore) = setup(DesyncPolicy::Fail);
        keystore.ensure_key_material(&alice()).await.unwrap();
        local.set(&private_key_name("alice"), "not a key").unwrap();

        let result = keystore.ensure_key_material(&alice()).await;
        assert!(matches!(result, Err(KeyStoreError::Desynchronized { .. })));
        assert_eq!(store.record_writes(), 1);
        assert_eq!(
            local.get(&private_key_name("alice")).unwrap().as_deref(),
            Some("not a key")
        );
    }

    #[tokio::test]
    async fn test_directory_outage_surfaces() {
        let (store, _local, keystore) = setup(DesyncPolicy::Regenerate);
        store.set_unavailable(true);
        let result = keystore.ensure_key_material(&alice()).await;
        assert!(matches!(result, Err(KeyStoreError::Directory(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config: KeyStoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.modulus_bits, 2048);
        assert_eq!(config.desync_policy, DesyncPolicy::Regenerate);
    }
}
