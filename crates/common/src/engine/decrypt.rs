use chrono::{DateTime, Utc};
use futures::future::join_all;
use uuid::Uuid;

use crate::crypto::{decode_binary, DecryptKey};
use crate::envelope::{Body, Envelope};

/// Why a message could not be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unreadable {
    /// The local identity is not among the message's recipients
    NotAddressed,
    /// This device holds no private key for the local identity
    NoPrivateKey,
    /// The stored ciphertext is not valid base64
    Encoding,
    /// The ciphertext did not decrypt under the local key
    DecryptionFailure,
}

impl std::fmt::Display for Unreadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Unreadable::NotAddressed => "not addressed to you",
            Unreadable::NoPrivateKey => "no private key on this device",
            Unreadable::Encoding => "corrupt ciphertext",
            Unreadable::DecryptionFailure => "unable to decrypt",
        };
        write!(f, "[{}]", reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Text(String),
    Unreadable(Unreadable),
}

impl Decrypted {
    pub fn text(&self) -> Option<&str> {
        match self {
            Decrypted::Text(text) => Some(text),
            Decrypted::Unreadable(_) => None,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self, Decrypted::Text(_))
    }
}

impl std::fmt::Display for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decrypted::Text(text) => write!(f, "{}", text),
            Decrypted::Unreadable(reason) => write!(f, "{}", reason),
        }
    }
}

/// A feed entry ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub id: Uuid,
    pub sender_identity: String,
    pub sender_label: String,
    pub created_at: DateTime<Utc>,
    /// Whether the stored record was encrypted
    pub encrypted: bool,
    pub body: Decrypted,
}

impl DecodedMessage {
    fn new(envelope: &Envelope, body: Decrypted) -> Self {
        Self {
            id: envelope.id,
            sender_identity: envelope.sender_identity.clone(),
            sender_label: envelope.sender_label.clone(),
            created_at: envelope.created_at,
            encrypted: envelope.body.is_encrypted(),
            body,
        }
    }
}

impl std::fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sender = if self.sender_label.is_empty() {
            &self.sender_identity
        } else {
            &self.sender_label
        };
        write!(
            f,
            "{} {}{}: {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            sender,
            if self.encrypted { " (e2e)" } else { "" },
            self.body
        )
    }
}

/// Recover the text of one envelope for `local_uid`
///
/// Never fails: anything that cannot be read comes back as
/// [`Decrypted::Unreadable`].
pub fn decrypt(envelope: &Envelope, local_uid: &str, key: Option<&DecryptKey>) -> Decrypted {
    let cipher = match &envelope.body {
        Body::Plain { text } => return Decrypted::Text(text.clone()),
        Body::GroupCipher { ciphers } => ciphers.get(local_uid),
        Body::SingleCipher {
            recipient,
            for_sender,
            for_recipient,
        } => {
            if envelope.sender_identity == local_uid {
                Some(for_sender)
            } else if recipient == local_uid {
                Some(for_recipient)
            } else {
                None
            }
        }
    };

    let Some(cipher) = cipher else {
        return Decrypted::Unreadable(Unreadable::NotAddressed);
    };
    let Some(key) = key else {
        return Decrypted::Unreadable(Unreadable::NoPrivateKey);
    };

    let bytes = match decode_binary(cipher) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("message {} has malformed ciphertext: {}", envelope.id, e);
            return Decrypted::Unreadable(Unreadable::Encoding);
        }
    };
    let plaintext = match key.decrypt(&bytes) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::debug!("message {} did not decrypt: {}", envelope.id, e);
            return Decrypted::Unreadable(Unreadable::DecryptionFailure);
        }
    };
    match String::from_utf8(plaintext) {
        Ok(text) => Decrypted::Text(text),
        Err(_) => {
            tracing::debug!("message {} decrypted to invalid UTF-8", envelope.id);
            Decrypted::Unreadable(Unreadable::DecryptionFailure)
        }
    }
}

/// Decrypt a whole snapshot
///
/// Each envelope is decoded independently; the output has the same length
/// and order as `batch`.
pub async fn decrypt_batch(
    batch: &[Envelope],
    local_uid: &str,
    key: Option<&DecryptKey>,
) -> Vec<DecodedMessage> {
    join_all(batch.iter().map(|envelope| async move {
        DecodedMessage::new(envelope, decrypt(envelope, local_uid, key))
    }))
    .await
}
