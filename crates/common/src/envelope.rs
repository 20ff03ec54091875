//! # Envelopes
//!
//! An envelope is one persisted chat message record. The body is a tagged
//! variant so readers dispatch on its shape instead of probing optional
//! fields:
//!
//! - [`Body::Plain`]: legacy or fallback clear text
//! - [`Body::SingleCipher`]: two-party message carrying one ciphertext for the
//!   sender's own key and one for the recipient
//! - [`Body::GroupCipher`]: one ciphertext per recipient identity
//!
//! ## Wire Format
//!
//! Envelopes are stored as flat camelCase JSON documents. The `encrypted`
//! flag decides how the rest is read: when it is absent or false the record
//! is plain, whatever other fields it carries.
//!
//! ```text
//! { "id": "...", "text": "hi", "createdAt": "...", "senderIdentity": "a", "senderLabel": "a@x" }
//! { "id": "...", "encrypted": true, "ciphers": { "a": "...", "b": "..." }, ... }
//! { "id": "...", "encrypted": true, "recipientIdentity": "b",
//!   "senderCipher": "...", "recipientCipher": "...", ... }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Identity;

/// Map from recipient uid to base64 ciphertext
pub type Ciphers = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("encrypted envelope {0} carries neither group nor pairwise ciphertext")]
    MissingCiphertext(Uuid),
    #[error("pairwise envelope {0} is missing field {1}")]
    IncompletePair(Uuid, &'static str),
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The payload of an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Plain {
        text: String,
    },
    SingleCipher {
        recipient: String,
        for_sender: String,
        for_recipient: String,
    },
    GroupCipher {
        ciphers: Ciphers,
    },
}

impl Body {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Body::Plain { .. })
    }
}

/// One chat message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    pub id: Uuid,
    pub sender_identity: String,
    pub sender_label: String,
    pub created_at: DateTime<Utc>,
    pub body: Body,
}

impl Envelope {
    /// Build an envelope stamped with a fresh id and the current time
    pub fn new(sender: &Identity, body: Body) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_identity: sender.uid.clone(),
            sender_label: sender.label.clone(),
            created_at: Utc::now(),
            body,
        }
    }

    pub fn plain(sender: &Identity, text: impl Into<String>) -> Self {
        Self::new(sender, Body::Plain { text: text.into() })
    }

    pub fn group(sender: &Identity, ciphers: Ciphers) -> Self {
        Self::new(sender, Body::GroupCipher { ciphers })
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Flat document shape shared by every envelope revision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ciphers: Option<Ciphers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient_cipher: Option<String>,
    created_at: DateTime<Utc>,
    sender_identity: String,
    #[serde(default)]
    sender_label: String,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let body = if !wire.encrypted.unwrap_or(false) {
            Body::Plain {
                text: wire.text.unwrap_or_default(),
            }
        } else if let Some(ciphers) = wire.ciphers {
            Body::GroupCipher { ciphers }
        } else if wire.recipient_identity.is_some()
            || wire.sender_cipher.is_some()
            || wire.recipient_cipher.is_some()
        {
            Body::SingleCipher {
                recipient: wire
                    .recipient_identity
                    .ok_or(EnvelopeError::IncompletePair(wire.id, "recipientIdentity"))?,
                for_sender: wire
                    .sender_cipher
                    .ok_or(EnvelopeError::IncompletePair(wire.id, "senderCipher"))?,
                for_recipient: wire
                    .recipient_cipher
                    .ok_or(EnvelopeError::IncompletePair(wire.id, "recipientCipher"))?,
            }
        } else {
            return Err(EnvelopeError::MissingCiphertext(wire.id));
        };

        Ok(Envelope {
            id: wire.id,
            sender_identity: wire.sender_identity,
            sender_label: wire.sender_label,
            created_at: wire.created_at,
            body,
        })
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let mut wire = WireEnvelope {
            id: envelope.id,
            created_at: envelope.created_at,
            sender_identity: envelope.sender_identity,
            sender_label: envelope.sender_label,
            ..Default::default()
        };
        match envelope.body {
            Body::Plain { text } => {
                wire.text = Some(text);
            }
            Body::SingleCipher {
                recipient,
                for_sender,
                for_recipient,
            } => {
                wire.encrypted = Some(true);
                wire.recipient_identity = Some(recipient);
                wire.sender_cipher = Some(for_sender);
                wire.recipient_cipher = Some(for_recipient);
            }
            Body::GroupCipher { ciphers } => {
                wire.encrypted = Some(true);
                wire.ciphers = Some(ciphers);
            }
        }
        wire
    }
}

/// A full, ordered snapshot of the message log
pub type EnvelopeBatch = Vec<Envelope>;

#[cfg(test)]
mod test {
    use super::*;

    fn alice() -> Identity {
        Identity::new("alice", "alice@example.com")
    }

    #[test]
    fn test_plain_wire_shape() {
        let envelope = Envelope::plain(&alice(), "hello");
        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["text"], "hello");
        assert_eq!(value["senderIdentity"], "alice");
        assert_eq!(value["senderLabel"], "alice@example.com");
        assert!(value.get("encrypted").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_group_wire_shape() {
        let mut ciphers = Ciphers::new();
        ciphers.insert("alice".to_string(), "AAAA".to_string());
        let envelope = Envelope::group(&alice(), ciphers);
        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["encrypted"], true);
        assert_eq!(value["ciphers"]["alice"], "AAAA");
        assert!(value.get("text").is_none());

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_legacy_plain_record_without_flag() {
        let json = r#"{
            "id": "6f1c2a3e-0000-4000-8000-000000000001",
            "text": "legacy",
            "createdAt": "2024-01-01T00:00:00Z",
            "senderIdentity": "bob"
        }"#;
        let envelope = Envelope::from_json(json).unwrap();
        assert_eq!(envelope.body, Body::Plain { text: "legacy".to_string() });
        assert_eq!(envelope.sender_label, "");
    }

    #[test]
    fn test_encrypted_false_is_plain_even_with_ciphers() {
        let json = r#"{
            "id": "6f1c2a3e-0000-4000-8000-000000000002",
            "text": "visible",
            "encrypted": false,
            "ciphers": { "bob": "AAAA" },
            "createdAt": "2024-01-01T00:00:00Z",
            "senderIdentity": "bob"
        }"#;
        let envelope = Envelope::from_json(json).unwrap();
        assert!(!envelope.body.is_encrypted());
    }

    #[test]
    fn test_single_cipher_parsing() {
        let json = r#"{
            "id": "6f1c2a3e-0000-4000-8000-000000000003",
            "encrypted": true,
            "recipientIdentity": "bob",
            "senderCipher": "AAAA",
            "recipientCipher": "BBBB",
            "createdAt": "2024-01-01T00:00:00Z",
            "senderIdentity": "alice"
        }"#;
        let envelope = Envelope::from_json(json).unwrap();
        assert_eq!(
            envelope.body,
            Body::SingleCipher {
                recipient: "bob".to_string(),
                for_sender: "AAAA".to_string(),
                for_recipient: "BBBB".to_string(),
            }
        );
        let reparsed = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn test_encrypted_without_ciphertext_rejected() {
        let json = r#"{
            "id": "6f1c2a3e-0000-4000-8000-000000000004",
            "encrypted": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "senderIdentity": "alice"
        }"#;
        assert!(Envelope::from_json(json).is_err());

        let partial = r#"{
            "id": "6f1c2a3e-0000-4000-8000-000000000005",
            "encrypted": true,
            "recipientIdentity": "bob",
            "createdAt": "2024-01-01T00:00:00Z",
            "senderIdentity": "alice"
        }"#;
        assert!(Envelope::from_json(partial).is_err());
    }
}
