//! Encrypted wallet export
//!
//! Envelope fields are base64. The key is derived from the passphrase with
//! Argon2id and the cipher is ChaCha20-Poly1305, so the ciphertext carries a
//! 16-byte authentication tag; a wrong passphrase or a tampered envelope
//! fails with `Error::Decryption` instead of yielding garbage. `agent_id` and
//! `public_id` are bound as associated data.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const ENVELOPE_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Serializable encrypted wallet export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: u32,
    pub agent_id: String,
    pub public_id: String,
    pub salt: String,
    pub iv: String,
    pub cipher_text: String,
}

impl ExportEnvelope {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Decryption(format!("Malformed envelope: {}", e)))
    }
}

/// Argon2id key-encryption key
fn derive_key(
    passphrase: &str,
    salt: &[u8],
) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, argon2::Error> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::default().hash_password_into(passphrase.as_bytes(), salt, &mut *key)?;
    Ok(key)
}

fn associated_data(agent_id: &str, public_id: &str) -> Vec<u8> {
    format!("{}|{}", agent_id, public_id).into_bytes()
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.as_bytes())
        .map_err(|e| Error::Decryption(format!("Invalid {} encoding: {}", name, e)))
}

/// Encrypt an exported secret into an envelope
pub fn seal(
    agent_id: &str,
    public_id: &Pubkey,
    exported_secret: &str,
    passphrase: &str,
) -> Result<ExportEnvelope> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| Error::Encryption(format!("Failed to initialize cipher: {}", e)))?;

    let public_id = public_id.to_string();
    let aad = associated_data(agent_id, &public_id);
    let cipher_text = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: exported_secret.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| Error::Encryption(format!("Failed to encrypt secret: {}", e)))?;

    Ok(ExportEnvelope {
        version: ENVELOPE_VERSION,
        agent_id: agent_id.to_string(),
        public_id,
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(nonce_bytes),
        cipher_text: STANDARD.encode(cipher_text),
    })
}

/// Decrypt an envelope back to the exported secret encoding
pub fn open(envelope: &ExportEnvelope, passphrase: &str) -> Result<Zeroizing<String>> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(Error::Decryption(format!(
            "Unsupported envelope version {}",
            envelope.version
        )));
    }

    let salt = decode_field("salt", &envelope.salt)?;
    let nonce_bytes = decode_field("iv", &envelope.iv)?;
    let cipher_text = decode_field("cipher text", &envelope.cipher_text)?;

    if nonce_bytes.len() != NONCE_LEN {
        return Err(Error::Decryption("Invalid iv length".to_string()));
    }

    let key = derive_key(passphrase, &salt)
        .map_err(|e| Error::Decryption(format!("Key derivation failed: {}", e)))?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| Error::Decryption(format!("Failed to initialize cipher: {}", e)))?;

    let aad = associated_data(&envelope.agent_id, &envelope.public_id);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &cipher_text,
                aad: &aad,
            },
        )
        .map_err(|_| {
            Error::Decryption("Authentication failed (wrong passphrase or corrupted data)".to_string())
        })?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption("Decrypted secret is not valid UTF-8".to_string()))
}
