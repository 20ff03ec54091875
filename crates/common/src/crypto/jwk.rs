//! JWK-shaped interchange form for RSA-OAEP keys
//!
//! Keys are published and persisted as JSON objects compatible with the
//! `RSA-OAEP-256` JSON Web Key layout: big integers are unpadded base64url
//! encodings of their big-endian bytes.
//!
//! ```text
//! { "kty": "RSA", "alg": "RSA-OAEP-256", "key_ops": ["encrypt"], "ext": true,
//!   "n": "...", "e": "AQAB" }
//! ```
//!
//! The CRT parameters `dp`, `dq` and `qi` are accepted on import but never
//! relied upon; they are recomputed from `p` and `q`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::BigUint;
use serde::{Deserialize, Serialize};

use super::keys::KeyError;

/// Key type for every key this crate produces
pub const JWK_KTY: &str = "RSA";
/// Algorithm identifier for OAEP with SHA-256
pub const JWK_ALG: &str = "RSA-OAEP-256";

pub(crate) const OP_ENCRYPT: &str = "encrypt";
pub(crate) const OP_DECRYPT: &str = "decrypt";

/// Public half of a keypair, the only part ever transmitted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<String>,
    #[serde(default)]
    pub ext: bool,
    pub n: String,
    pub e: String,
}

/// Private half of a keypair. Device-local only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateJwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<String>,
    #[serde(default)]
    pub ext: bool,
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: String,
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

// Never print private exponents into logs
impl std::fmt::Debug for PrivateJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateJwk")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("key_ops", &self.key_ops)
            .field("n", &self.n)
            .field("e", &self.e)
            .finish_non_exhaustive()
    }
}

impl PublicJwk {
    /// Parse a public key from its JSON interchange form
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        serde_json::from_str(json)
            .map_err(|e| KeyError::KeyFormat(format!("public key is not valid JWK JSON: {}", e)))
    }

    /// Serialize the public key to its JSON interchange form
    pub fn to_json(&self) -> String {
        // a struct of strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    pub(crate) fn check_usage(&self) -> Result<(), KeyError> {
        check_header(&self.kty, self.alg.as_deref(), &self.key_ops, OP_ENCRYPT)
    }
}

impl PrivateJwk {
    /// Parse a private key from its JSON interchange form
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        serde_json::from_str(json)
            .map_err(|e| KeyError::KeyFormat(format!("private key is not valid JWK JSON: {}", e)))
    }

    /// Serialize the private key to its JSON interchange form
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The public half embedded in this private key
    pub fn public(&self) -> PublicJwk {
        PublicJwk {
            kty: self.kty.clone(),
            alg: self.alg.clone(),
            key_ops: vec![OP_ENCRYPT.to_string()],
            ext: true,
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }

    pub(crate) fn check_usage(&self) -> Result<(), KeyError> {
        check_header(&self.kty, self.alg.as_deref(), &self.key_ops, OP_DECRYPT)
    }
}

fn check_header(kty: &str, alg: Option<&str>, key_ops: &[String], op: &str) -> Result<(), KeyError> {
    if kty != JWK_KTY {
        return Err(KeyError::KeyFormat(format!(
            "unsupported key type {}, expected {}",
            kty, JWK_KTY
        )));
    }
    if let Some(alg) = alg {
        if alg != JWK_ALG {
            return Err(KeyError::KeyFormat(format!(
                "unsupported algorithm {}, expected {}",
                alg, JWK_ALG
            )));
        }
    }
    // An empty key_ops list places no restriction on usage
    if !key_ops.is_empty() && !key_ops.iter().any(|o| o == op) {
        return Err(KeyError::KeyFormat(format!(
            "key_ops {:?} do not permit {}",
            key_ops, op
        )));
    }
    Ok(())
}

pub(crate) fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

pub(crate) fn decode_uint(field: &str, encoded: &str) -> Result<BigUint, KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| KeyError::KeyFormat(format!("field {} is not base64url: {}", field, e)))?;
    if bytes.is_empty() {
        return Err(KeyError::KeyFormat(format!("field {} is empty", field)));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}
