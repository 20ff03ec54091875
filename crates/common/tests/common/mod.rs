//! Shared test utilities for chat integration tests
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use common::auth::{Identity, StaticAuth};
use common::context::{ChatConfig, Context};
use common::crypto::{KeyPair, DEFAULT_MODULUS_BITS};
use common::local::{LocalStore, MemoryLocalStore};
use common::store::DocumentStore;

/// One simulated device: its own local storage and auth provider, talking to
/// a shared document store
pub struct Client<S: DocumentStore> {
    pub ctx: Arc<Context<S>>,
    pub auth: Arc<StaticAuth>,
    pub local: Arc<dyn LocalStore>,
}

pub fn identity(uid: &str) -> Identity {
    Identity::new(uid, format!("{}@example.com", uid))
}

/// A signed-in client with in-memory local storage
pub fn client<S: DocumentStore>(store: &S, uid: &str) -> Client<S> {
    client_with(store, uid, Arc::new(MemoryLocalStore::new()), ChatConfig::default())
}

pub fn client_with<S: DocumentStore>(
    store: &S,
    uid: &str,
    local: Arc<dyn LocalStore>,
    config: ChatConfig,
) -> Client<S> {
    let auth = Arc::new(StaticAuth::new(Some(identity(uid))));
    let ctx = Arc::new(Context::new(store.clone(), local.clone(), auth.clone(), config));
    Client { ctx, auth, local }
}

/// Pre-generated key pairs; RSA generation dominates test time otherwise
pub fn key_pair(index: usize) -> &'static KeyPair {
    static PAIRS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    &PAIRS.get_or_init(|| {
        (0..3)
            .map(|_| KeyPair::generate(DEFAULT_MODULUS_BITS).unwrap())
            .collect()
    })[index]
}

/// Install logging for a test run; safe to call more than once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
