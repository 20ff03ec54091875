/**
 * Cryptographic types and operations.
 *  - RSA-OAEP key pairs and single-purpose handles
 *  - JWK interchange and base64 transcoding
 */
pub mod crypto;
/**
 * Persisted message records and their
 *  wire format.
 */
pub mod envelope;
/**
 * Identity and the auth collaborator.
 */
pub mod auth;
/**
 * Device-local key/value persistence.
 */
pub mod local;
/**
 * Shared document store: the public-key
 *  directory and the message log, with
 *  in-memory and file-backed providers.
 */
pub mod store;
/**
 * Per-identity key lifecycle: generate,
 *  persist locally, publish.
 */
pub mod keystore;
/**
 * Group fan-out encryption and tolerant
 *  decryption of the message feed.
 */
pub mod engine;
/**
 * Explicit context object handed to
 *  everything that talks to collaborators.
 */
pub mod context;
/**
 * Signed-in session, send path and the
 *  decrypted live feed.
 */
pub mod session;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::auth::{AuthProvider, Identity, StaticAuth};
    pub use crate::context::{ChatConfig, Context};
    pub use crate::crypto::{DecryptKey, EncryptKey, KeyPair, PrivateJwk, PublicJwk};
    pub use crate::engine::{DecodedMessage, Decrypted, Unreadable};
    pub use crate::envelope::{Body, Envelope, EnvelopeBatch};
    pub use crate::keystore::{DesyncPolicy, KeyMaterialReport, KeyStore, KeyStoreConfig};
    pub use crate::local::{FileLocalStore, LocalStore, MemoryLocalStore};
    pub use crate::session::{EncryptionMode, Feed, FeedState, SendError, Session};
    pub use crate::store::{DocumentStore, FsStore, MemoryStore, PublicKeyRecord};
    pub use crate::version::BuildInfo;
}
