//! Cryptographic primitives for CipherChat
//!
//! This module provides the cryptographic foundation for the chat's security model:
//!
//! - **Identity keys**: one RSA-2048 keypair per identity (public exponent 65537)
//! - **Encryption**: RSA-OAEP with SHA-256 for both the label digest and MGF1
//! - **Interchange**: JWK-shaped JSON for publishing and persisting keys
//! - **Transcoding**: standard base64 for ciphertext on the wire
//!
//! # Security Model
//!
//! ## Key Ownership
//! The private half of a [`KeyPair`] never leaves the device that generated it.
//! Only the [`PublicJwk`] is ever published to the shared directory.
//!
//! ## Single-Purpose Handles
//! Importing a key yields either an [`EncryptKey`] or a [`DecryptKey`], never a
//! handle that can do both. A leaked encrypt handle cannot read anything; a
//! decrypt handle can only be narrowed to its public counterpart.
//!
//! ## Fan-out
//! A group message is encrypted once per recipient public key. There is no
//! shared group secret: adding a recipient to the directory only affects
//! messages sent after the directory scan that saw them.

mod codec;
mod jwk;
mod keys;

pub use codec::{decode_binary, encode_binary, CodecError};
pub use jwk::{PrivateJwk, PublicJwk, JWK_ALG, JWK_KTY};
pub use keys::{
    import_private_key, import_public_key, DecryptKey, EncryptKey, KeyError, KeyPair,
    DEFAULT_MODULUS_BITS, OAEP_DIGEST_SIZE, PUBLIC_EXPONENT,
};
