use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::{encode_binary, import_public_key, EncryptKey, KeyError, PublicJwk};
use crate::envelope::{Body, Ciphers};
use crate::store::PublicKeyRecord;

/// One entry of the directory as seen by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub uid: String,
    /// `None` when the identity has no usable record
    pub public_key: Option<PublicJwk>,
}

impl Recipient {
    pub fn new(uid: impl Into<String>, public_key: Option<PublicJwk>) -> Self {
        Self {
            uid: uid.into(),
            public_key,
        }
    }
}

impl From<PublicKeyRecord> for Recipient {
    fn from(record: PublicKeyRecord) -> Self {
        Self {
            uid: record.identity,
            public_key: Some(record.public_key),
        }
    }
}

/// Why a recipient was left out of a group message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientWarning {
    MissingKey,
    KeyFormat(String),
}

impl std::fmt::Display for RecipientWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientWarning::MissingKey => write!(f, "no published public key"),
            RecipientWarning::KeyFormat(reason) => write!(f, "unusable public key: {}", reason),
        }
    }
}

/// Result of a group fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCiphertext {
    /// Base64 ciphertext per reachable recipient
    pub ciphers: Ciphers,
    /// Recipients that were skipped, and why
    pub warnings: BTreeMap<String, RecipientWarning>,
}

impl GroupCiphertext {
    pub fn warned_uids(&self) -> BTreeSet<&str> {
        self.warnings.keys().map(String::as_str).collect()
    }

    pub fn is_unreachable(&self) -> bool {
        self.ciphers.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("no recipients to encrypt for")]
    NoRecipients,
    #[error("message of {len} bytes exceeds the {max} byte limit of recipient {uid}")]
    MessageTooLong { uid: String, len: usize, max: usize },
    #[error("encryption failed: {0}")]
    Key(#[from] KeyError),
}

/// Encrypt `plaintext` separately under every recipient's public key
///
/// Recipients without a key or with a malformed key are skipped and reported
/// in [`GroupCiphertext::warnings`]; they never fail the call. A uid listed
/// more than once is encrypted for once, using its first entry.
///
/// # Errors
///
/// - [`EncryptError::NoRecipients`] if `recipients` is empty
/// - [`EncryptError::MessageTooLong`] if any reachable key cannot carry the
///   plaintext; nothing is encrypted in that case
pub fn encrypt_for_group(
    plaintext: &str,
    recipients: &[Recipient],
) -> Result<GroupCiphertext, EncryptError> {
    if recipients.is_empty() {
        return Err(EncryptError::NoRecipients);
    }

    let mut result = GroupCiphertext::default();
    let mut seen = BTreeSet::new();
    let mut reachable: Vec<(&str, EncryptKey)> = Vec::new();

    for recipient in recipients {
        if !seen.insert(recipient.uid.as_str()) {
            continue;
        }
        let Some(jwk) = &recipient.public_key else {
            tracing::warn!("recipient {} has no public key, skipping", recipient.uid);
            result
                .warnings
                .insert(recipient.uid.clone(), RecipientWarning::MissingKey);
            continue;
        };
        match import_public_key(jwk) {
            Ok(key) => reachable.push((recipient.uid.as_str(), key)),
            Err(e) => {
                tracing::warn!("recipient {} has an unusable public key: {}", recipient.uid, e);
                result
                    .warnings
                    .insert(recipient.uid.clone(), RecipientWarning::KeyFormat(e.to_string()));
            }
        }
    }

    let bytes = plaintext.as_bytes();
    if let Some((uid, key)) = reachable
        .iter()
        .find(|(_, key)| bytes.len() > key.max_plaintext_len())
    {
        return Err(EncryptError::MessageTooLong {
            uid: uid.to_string(),
            len: bytes.len(),
            max: key.max_plaintext_len(),
        });
    }

    for (uid, key) in reachable {
        let ciphertext = key.encrypt(bytes)?;
        result.ciphers.insert(uid.to_string(), encode_binary(&ciphertext));
    }

    tracing::debug!(
        "encrypted for {} recipients, {} skipped",
        result.ciphers.len(),
        result.warnings.len()
    );
    Ok(result)
}

/// Encrypt a two-party message
///
/// The sender gets a copy under their own key so they can read their own
/// history.
pub fn encrypt_for_pair(
    plaintext: &str,
    sender_key: &EncryptKey,
    recipient_uid: &str,
    recipient_key: &EncryptKey,
) -> Result<Body, EncryptError> {
    let bytes = plaintext.as_bytes();
    let for_sender = sender_key.encrypt(bytes).map_err(|e| too_long(e, "sender"))?;
    let for_recipient = recipient_key
        .encrypt(bytes)
        .map_err(|e| too_long(e, recipient_uid))?;
    Ok(Body::SingleCipher {
        recipient: recipient_uid.to_string(),
        for_sender: encode_binary(&for_sender),
        for_recipient: encode_binary(&for_recipient),
    })
}

fn too_long(e: KeyError, uid: &str) -> EncryptError {
    match e {
        KeyError::MessageTooLong { len, max } => EncryptError::MessageTooLong {
            uid: uid.to_string(),
            len,
            max,
        },
        other => EncryptError::Key(other),
    }
}

#[cfg(test)]
mod test {
    use std::sync::OnceLock;

    use super::*;
    use crate::crypto::{decode_binary, KeyPair, DEFAULT_MODULUS_BITS};

    fn pairs() -> &'static [KeyPair; 2] {
        static PAIRS: OnceLock<[KeyPair; 2]> = OnceLock::new();
        PAIRS.get_or_init(|| {
            [
                KeyPair::generate(DEFAULT_MODULUS_BITS).unwrap(),
                KeyPair::generate(DEFAULT_MODULUS_BITS).unwrap(),
            ]
        })
    }

    fn open(pair: &KeyPair, cipher: &str) -> String {
        let bytes = pair.decrypt_key().decrypt(&decode_binary(cipher).unwrap()).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_group_fanout() {
        let [a, b] = pairs();
        let recipients = vec![
            Recipient::new("a", Some(a.public_jwk())),
            Recipient::new("b", Some(b.public_jwk())),
        ];

        let result = encrypt_for_group("hello group", &recipients).unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(result.ciphers.len(), 2);
        assert_eq!(open(a, &result.ciphers["a"]), "hello group");
        assert_eq!(open(b, &result.ciphers["b"]), "hello group");
    }

    #[test]
    fn test_missing_and_malformed_keys_become_warnings() {
        let [a, _] = pairs();
        let mut broken = a.public_jwk();
        broken.n = "!!".to_string();
        let recipients = vec![
            Recipient::new("a", Some(a.public_jwk())),
            Recipient::new("c", None),
            Recipient::new("d", Some(broken)),
        ];

        let result = encrypt_for_group("hi", &recipients).unwrap();
        assert_eq!(result.ciphers.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(result.warned_uids(), BTreeSet::from(["c", "d"]));
        assert_eq!(result.warnings["c"], RecipientWarning::MissingKey);
        assert!(matches!(result.warnings["d"], RecipientWarning::KeyFormat(_)));
    }

    #[test]
    fn test_all_recipients_missing_is_not_an_error() {
        let result =
            encrypt_for_group("hi", &[Recipient::new("x", None), Recipient::new("y", None)])
                .unwrap();
        assert!(result.is_unreachable());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_empty_recipients_rejected() {
        assert!(matches!(
            encrypt_for_group("hi", &[]),
            Err(EncryptError::NoRecipients)
        ));
    }

    #[test]
    fn test_duplicate_recipients_collapse() {
        let [a, b] = pairs();
        let recipients = vec![
            Recipient::new("a", Some(a.public_jwk())),
            Recipient::new("a", Some(b.public_jwk())),
        ];
        let result = encrypt_for_group("once", &recipients).unwrap();
        assert_eq!(result.ciphers.len(), 1);
        assert_eq!(open(a, &result.ciphers["a"]), "once");
    }

    #[test]
    fn test_oversized_message_fails_whole_send() {
        let [a, _] = pairs();
        let text = "x".repeat(191);
        let result = encrypt_for_group(&text, &[Recipient::new("a", Some(a.public_jwk()))]);
        assert!(matches!(
            result,
            Err(EncryptError::MessageTooLong { len: 191, max: 190, .. })
        ));
    }

    #[test]
    fn test_pair_body() {
        let [a, b] = pairs();
        let body = encrypt_for_pair("psst", &a.encrypt_key(), "b", &b.encrypt_key()).unwrap();
        let Body::SingleCipher {
            recipient,
            for_sender,
            for_recipient,
        } = body
        else {
            panic!("expected a single-cipher body");
        };
        assert_eq!(recipient, "b");
        assert_eq!(open(a, &for_sender), "psst");
        assert_eq!(open(b, &for_recipient), "psst");
    }
}
