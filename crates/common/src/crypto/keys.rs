use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::jwk::{decode_uint, encode_uint, PrivateJwk, PublicJwk, JWK_ALG, JWK_KTY, OP_DECRYPT, OP_ENCRYPT};

/// Modulus size used for every generated keypair
pub const DEFAULT_MODULUS_BITS: usize = 2048;
/// Fixed public exponent (F4)
pub const PUBLIC_EXPONENT: u32 = 65537;
/// Output size of the OAEP digest (SHA-256) in bytes
pub const OAEP_DIGEST_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),
    #[error("malformed key: {0}")]
    KeyFormat(String),
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed")]
    Decrypt,
    #[error("plaintext of {len} bytes exceeds the {max} byte limit of the recipient key")]
    MessageTooLong { len: usize, max: usize },
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// An identity's RSA keypair
///
/// Generated once per identity and device. The private half is persisted in
/// local storage as a [`PrivateJwk`]; the public half is published to the
/// directory as a [`PublicJwk`].
///
/// # Examples
///
/// ```ignore
/// let pair = KeyPair::generate(DEFAULT_MODULUS_BITS)?;
/// let public = pair.public_jwk();
///
/// let ciphertext = import_public_key(&public)?.encrypt(b"hello")?;
/// let plaintext = pair.decrypt_key().decrypt(&ciphertext)?;
/// ```
#[derive(Debug, Clone)]
pub struct KeyPair(RsaPrivateKey);

impl KeyPair {
    /// Generate a new keypair with the given modulus size and exponent 65537
    ///
    /// This is CPU bound and can take hundreds of milliseconds; async callers
    /// should run it on a blocking thread.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let exp = BigUint::from(PUBLIC_EXPONENT);
        let key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &exp)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self(key))
    }

    /// Rebuild a keypair from its private interchange form
    pub fn from_jwk(jwk: &PrivateJwk) -> Result<Self, KeyError> {
        if jwk.kty != JWK_KTY {
            return Err(KeyError::KeyFormat(format!("unsupported key type {}", jwk.kty)));
        }
        let n = decode_uint("n", &jwk.n)?;
        let e = decode_uint("e", &jwk.e)?;
        let d = decode_uint("d", &jwk.d)?;
        let p = decode_uint("p", &jwk.p)?;
        let q = decode_uint("q", &jwk.q)?;

        let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| KeyError::KeyFormat(format!("inconsistent private key: {}", e)))?;
        key.validate()
            .map_err(|e| KeyError::KeyFormat(format!("invalid private key: {}", e)))?;
        key.precompute()
            .map_err(|e| KeyError::KeyFormat(format!("invalid private key: {}", e)))?;
        Ok(Self(key))
    }

    /// Export the public half
    pub fn public_jwk(&self) -> PublicJwk {
        public_to_jwk(&self.0.to_public_key())
    }

    /// Export the private half
    ///
    /// The exported key is marked decrypt-only.
    pub fn private_jwk(&self) -> PrivateJwk {
        let primes = self.0.primes();
        PrivateJwk {
            kty: JWK_KTY.to_string(),
            alg: Some(JWK_ALG.to_string()),
            key_ops: vec![OP_DECRYPT.to_string()],
            ext: true,
            n: encode_uint(self.0.n()),
            e: encode_uint(self.0.e()),
            d: encode_uint(self.0.d()),
            p: primes.first().map(encode_uint).unwrap_or_default(),
            q: primes.get(1).map(encode_uint).unwrap_or_default(),
            dp: self.0.dp().map(encode_uint),
            dq: self.0.dq().map(encode_uint),
            qi: None,
        }
    }

    /// Narrow this keypair to a decrypt-only handle
    pub fn decrypt_key(&self) -> DecryptKey {
        DecryptKey(self.0.clone())
    }

    /// Narrow this keypair to an encrypt-only handle
    pub fn encrypt_key(&self) -> EncryptKey {
        EncryptKey(self.0.to_public_key())
    }

    /// Encode the private key as PKCS#8 PEM
    pub fn to_pkcs8_pem(&self) -> Result<String, KeyError> {
        let pem = self
            .0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("failed to encode PKCS#8 PEM: {}", e))?;
        Ok(pem.to_string())
    }

    /// Parse a private key from PKCS#8 PEM
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| KeyError::KeyFormat(format!("failed to parse PKCS#8 PEM: {}", e)))?;
        Ok(Self(key))
    }

    /// Encode the public key as SubjectPublicKeyInfo PEM
    pub fn public_pem(&self) -> Result<String, KeyError> {
        let pem = self
            .0
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("failed to encode SPKI PEM: {}", e))?;
        Ok(pem)
    }
}

fn public_to_jwk(key: &RsaPublicKey) -> PublicJwk {
    PublicJwk {
        kty: JWK_KTY.to_string(),
        alg: Some(JWK_ALG.to_string()),
        key_ops: vec![OP_ENCRYPT.to_string()],
        ext: true,
        n: encode_uint(key.n()),
        e: encode_uint(key.e()),
    }
}

/// Encrypt-only handle built from a recipient's published key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptKey(RsaPublicKey);

impl EncryptKey {
    /// Largest plaintext OAEP-SHA256 can carry under this key
    pub fn max_plaintext_len(&self) -> usize {
        self.0.size().saturating_sub(2 * OAEP_DIGEST_SIZE + 2)
    }

    /// Encrypt `plaintext` with OAEP-SHA256
    ///
    /// Output is probabilistic: encrypting the same plaintext twice yields
    /// different ciphertexts.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let max = self.max_plaintext_len();
        if plaintext.len() > max {
            return Err(KeyError::MessageTooLong {
                len: plaintext.len(),
                max,
            });
        }
        self.0
            .encrypt(&mut OsRng, oaep(), plaintext)
            .map_err(|e| KeyError::Encrypt(e.to_string()))
    }

    /// Export back to interchange form
    pub fn to_jwk(&self) -> PublicJwk {
        public_to_jwk(&self.0)
    }

    /// Encode as SubjectPublicKeyInfo PEM
    pub fn to_spki_pem(&self) -> Result<String, KeyError> {
        Ok(self
            .0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("failed to encode SPKI PEM: {}", e))?)
    }

    /// Parse from SubjectPublicKeyInfo PEM
    pub fn from_spki_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| KeyError::KeyFormat(format!("failed to parse SPKI PEM: {}", e)))?;
        Ok(Self(key))
    }
}

/// Decrypt-only handle over the local private key
#[derive(Clone)]
pub struct DecryptKey(RsaPrivateKey);

impl std::fmt::Debug for DecryptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DecryptKey").field(&"..").finish()
    }
}

impl DecryptKey {
    /// Decrypt an OAEP-SHA256 ciphertext
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Decrypt`] if the ciphertext was produced for a
    /// different key, was tampered with, or used different padding parameters.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        self.0
            .decrypt(oaep(), ciphertext)
            .map_err(|_| KeyError::Decrypt)
    }

    /// The public counterpart of this key, as an encrypt-only handle
    pub fn encrypt_key(&self) -> EncryptKey {
        EncryptKey(self.0.to_public_key())
    }

    /// The public counterpart of this key, in interchange form
    pub fn public_jwk(&self) -> PublicJwk {
        public_to_jwk(&self.0.to_public_key())
    }
}

/// Import a published key for encryption only
///
/// # Errors
///
/// Returns [`KeyError::KeyFormat`] if the key is not an RSA-OAEP-256 key,
/// its `key_ops` forbid encryption, or its components are malformed.
pub fn import_public_key(jwk: &PublicJwk) -> Result<EncryptKey, KeyError> {
    jwk.check_usage()?;
    let n = decode_uint("n", &jwk.n)?;
    let e = decode_uint("e", &jwk.e)?;
    let key = RsaPublicKey::new(n, e)
        .map_err(|e| KeyError::KeyFormat(format!("invalid public key: {}", e)))?;
    Ok(EncryptKey(key))
}

/// Import a locally persisted key for decryption only
///
/// # Errors
///
/// Returns [`KeyError::KeyFormat`] if the key is not an RSA-OAEP-256 key,
/// its `key_ops` forbid decryption, or its components are inconsistent.
pub fn import_private_key(jwk: &PrivateJwk) -> Result<DecryptKey, KeyError> {
    jwk.check_usage()?;
    Ok(KeyPair::from_jwk(jwk)?.decrypt_key())
}
