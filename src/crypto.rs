//! Hashing and message sealing for token delivery
//!
//! Token pairs reach the depositor as an encrypted message only they can open:
//! X25519 agreement between the custodial sealing key and the depositor's
//! public key, then XChaCha20-Poly1305 under `keccak256(shared_secret)`.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use eyre::{eyre, Result};
use tiny_keccak::{Hasher, Keccak};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::types::EncryptedMessage;

/// Domain separator for deriving the sealing key from the custodial secret
const SEALING_KEY_DOMAIN: &[u8] = b"gift-message-key";

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Seals token messages for depositors
pub struct MessageSealer {
    secret: StaticSecret,
}

impl MessageSealer {
    /// Derive the sealing key from the custodial secret
    pub fn from_custodian_secret(secret: &[u8; 32]) -> Self {
        let mut material = Vec::with_capacity(SEALING_KEY_DOMAIN.len() + secret.len());
        material.extend_from_slice(SEALING_KEY_DOMAIN);
        material.extend_from_slice(secret);
        Self {
            secret: StaticSecret::from(keccak256(&material)),
        }
    }

    /// Public half of the sealing key; depositors need it to open messages
    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    /// Encrypt `plaintext` for the holder of `recipient_public_key`
    pub fn seal(
        &self,
        recipient_public_key: &[u8; 32],
        plaintext: &[u8],
    ) -> Result<EncryptedMessage> {
        let cipher = cipher_for(&self.secret, recipient_public_key);
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let data = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| eyre!("Failed to encrypt message"))?;

        let mut nonce_bytes = [0u8; 24];
        nonce_bytes.copy_from_slice(nonce.as_slice());
        Ok(EncryptedMessage {
            data,
            nonce: nonce_bytes,
        })
    }
}

/// Decrypt a sealed message with the recipient's secret and the sender's public key
pub fn open(
    recipient_secret: &StaticSecret,
    sender_public_key: &[u8; 32],
    message: &EncryptedMessage,
) -> Result<Vec<u8>> {
    let cipher = cipher_for(recipient_secret, sender_public_key);
    cipher
        .decrypt(XNonce::from_slice(&message.nonce), message.data.as_slice())
        .map_err(|_| eyre!("Failed to decrypt message"))
}

fn cipher_for(secret: &StaticSecret, their_public: &[u8; 32]) -> XChaCha20Poly1305 {
    let shared = secret.diffie_hellman(&PublicKey::from(*their_public));
    let key = keccak256(shared.as_bytes());
    XChaCha20Poly1305::new(Key::from_slice(&key))
}
