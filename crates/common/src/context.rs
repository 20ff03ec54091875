use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthProvider, Identity};
use crate::keystore::{KeyStore, KeyStoreConfig};
use crate::local::LocalStore;
use crate::store::DocumentStore;

/// Core behaviour switches, usually read from the profile's config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Encrypt outgoing messages. When off every message is sent plain.
    #[serde(default = "default_encryption_enabled")]
    pub encryption_enabled: bool,
    #[serde(default)]
    pub keys: KeyStoreConfig,
}

fn default_encryption_enabled() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            encryption_enabled: default_encryption_enabled(),
            keys: KeyStoreConfig::default(),
        }
    }
}

/// Everything the core needs from its environment
///
/// Built once at startup and shared behind an `Arc`; no part of the core
/// reaches for global state.
#[derive(Debug)]
pub struct Context<S: DocumentStore> {
    store: S,
    local: Arc<dyn LocalStore>,
    auth: Arc<dyn AuthProvider>,
    config: ChatConfig,
}

impl<S: DocumentStore> Context<S> {
    pub fn new(
        store: S,
        local: Arc<dyn LocalStore>,
        auth: Arc<dyn AuthProvider>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            local,
            auth,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.auth.current_identity()
    }

    pub fn keystore(&self) -> KeyStore<S> {
        KeyStore::new(
            self.store.clone(),
            self.local.clone(),
            self.config.keys.clone(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_from_toml() {
        let config: ChatConfig = toml::from_str(
            r#"
            encryption_enabled = false

            [keys]
            desync_policy = "fail"
            "#,
        )
        .unwrap();
        assert!(!config.encryption_enabled);
        assert_eq!(config.keys.modulus_bits, 2048);
        assert_eq!(
            config.keys.desync_policy,
            crate::keystore::DesyncPolicy::Fail
        );

        let defaults: ChatConfig = toml::from_str("").unwrap();
        assert!(defaults.encryption_enabled);
    }
}
