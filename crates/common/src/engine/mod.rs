//! Message encryption and decryption
//!
//! The send side fans a plaintext out to every recipient's public key
//! ([`encrypt_for_group`]) or, for the two-party form, to the sender and one
//! recipient ([`encrypt_for_pair`]). The receive side turns stored envelopes
//! back into text, marking anything it cannot read instead of failing
//! ([`decrypt`], [`decrypt_batch`]).

mod decrypt;
mod encrypt;

pub use decrypt::{decrypt, decrypt_batch, DecodedMessage, Decrypted, Unreadable};
pub use encrypt::{
    encrypt_for_group, encrypt_for_pair, EncryptError, GroupCiphertext, Recipient,
    RecipientWarning,
};
