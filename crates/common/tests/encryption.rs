//! Integration tests for group encryption and feed decryption

mod common;

use ::common::engine::{decrypt, decrypt_batch, encrypt_for_group, Decrypted, Recipient, Unreadable};
use ::common::envelope::{Body, Envelope};

fn group_envelope(sender: &str, text: &str, members: &[(&str, usize)]) -> Envelope {
    let recipients: Vec<_> = members
        .iter()
        .map(|(uid, idx)| Recipient::new(*uid, Some(common::key_pair(*idx).public_jwk())))
        .collect();
    let result = encrypt_for_group(text, &recipients).unwrap();
    Envelope::group(&common::identity(sender), result.ciphers)
}

#[test]
fn test_round_trip_for_every_recipient() {
    let members = [("a", 0), ("b", 1), ("c", 2)];
    let longest = "x".repeat(190);
    for text in ["hello", "", "ünïcødé ✓", longest.as_str()] {
        let envelope = group_envelope("a", text, &members);
        for (uid, idx) in members {
            let key = common::key_pair(idx).decrypt_key();
            assert_eq!(
                decrypt(&envelope, uid, Some(&key)),
                Decrypted::Text(text.to_string()),
                "recipient {} could not read {:?}",
                uid,
                text
            );
        }
    }
}

#[test]
fn test_outsider_is_excluded() {
    let envelope = group_envelope("a", "members only", &[("a", 0), ("b", 1)]);
    let Body::GroupCipher { ciphers } = &envelope.body else {
        panic!("expected a group body");
    };
    assert!(!ciphers.contains_key("c"));

    // even holding a valid key, an outsider reads nothing
    let outsider = common::key_pair(2).decrypt_key();
    assert_eq!(
        decrypt(&envelope, "c", Some(&outsider)),
        Decrypted::Unreadable(Unreadable::NotAddressed)
    );
}

#[test]
fn test_partial_directory() {
    let recipients = vec![
        Recipient::new("a", Some(common::key_pair(0).public_jwk())),
        Recipient::new("b", None),
        Recipient::new("c", Some(common::key_pair(2).public_jwk())),
    ];
    let result = encrypt_for_group("most of you", &recipients).unwrap();
    assert_eq!(
        result.ciphers.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["a", "c"]
    );
    assert_eq!(result.warned_uids().into_iter().collect::<Vec<_>>(), vec!["b"]);
}

#[test]
fn test_plain_passthrough() {
    let envelope = Envelope::plain(&common::identity("a"), "nothing to hide");
    let key = common::key_pair(0).decrypt_key();
    for key in [None, Some(&key)] {
        assert_eq!(
            decrypt(&envelope, "b", key),
            Decrypted::Text("nothing to hide".to_string())
        );
    }

    let legacy = Envelope::from_json(
        r#"{"id":"00000000-0000-4000-8000-000000000000","text":"old","createdAt":"2023-05-01T10:00:00Z","senderIdentity":"z"}"#,
    )
    .unwrap();
    assert_eq!(decrypt(&legacy, "b", None), Decrypted::Text("old".to_string()));
}

#[tokio::test]
async fn test_batch_independence() {
    let members = [("a", 0), ("b", 1)];
    let mut batch: Vec<Envelope> = (0..5)
        .map(|i| group_envelope("a", &format!("message {}", i), &members))
        .collect();

    if let Body::GroupCipher { ciphers } = &mut batch[2].body {
        let cipher = ciphers.get_mut("b").unwrap();
        let mut bytes = ::common::crypto::decode_binary(cipher).unwrap();
        bytes[0] ^= 0x01;
        *cipher = ::common::crypto::encode_binary(&bytes);
    }

    let key = common::key_pair(1).decrypt_key();
    let decoded = decrypt_batch(&batch, "b", Some(&key)).await;

    assert_eq!(decoded.len(), 5);
    for (i, message) in decoded.iter().enumerate() {
        assert_eq!(message.id, batch[i].id);
        if i == 2 {
            assert_eq!(
                message.body,
                Decrypted::Unreadable(Unreadable::DecryptionFailure)
            );
        } else {
            assert_eq!(message.body.text(), Some(format!("message {}", i).as_str()));
        }
    }
}
