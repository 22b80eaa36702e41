//! Signing collaborator
//!
//! The wallet never touches key bytes directly: it holds an opaque
//! `SecretMaterial` and hands it to a `SigningProvider`.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Opaque secret key material
///
/// Never printed, never serialized. The only way out is
/// `SigningProvider::export_secret`. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial(Vec<u8>);

impl SecretMaterial {
    /// Wrap raw secret bytes produced by a signing provider
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes, for signing providers only
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretMaterial(***)")
    }
}

/// Key generation and signing
pub trait SigningProvider: Send + Sync {
    /// Generate a fresh identity
    fn generate_identity(&self) -> Result<(Pubkey, SecretMaterial)>;

    /// Sign an arbitrary payload
    fn sign(&self, secret: &SecretMaterial, payload: &[u8]) -> Result<Signature>;

    /// Encode the secret for export (the only path that reveals it)
    fn export_secret(&self, secret: &SecretMaterial) -> Zeroizing<String>;

    /// Rebuild an identity from an `export_secret` encoding
    fn restore_identity(&self, encoded: &str) -> Result<(Pubkey, SecretMaterial)>;
}

/// Ed25519 signer backed by `solana_sdk::signature::Keypair`
///
/// Secrets are the 64-byte keypair encoding; exports are base58.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeypairSigner;

impl KeypairSigner {
    pub fn new() -> Self {
        Self
    }

    fn keypair(secret: &SecretMaterial) -> Result<Keypair> {
        Keypair::from_bytes(secret.expose())
            .map_err(|e| Error::InvalidKeypair(format!("Invalid keypair bytes: {}", e)))
    }
}

impl SigningProvider for KeypairSigner {
    fn generate_identity(&self) -> Result<(Pubkey, SecretMaterial)> {
        let keypair = Keypair::new();
        Ok((keypair.pubkey(), SecretMaterial::new(Zeroizing::new(keypair.to_bytes()).to_vec())))
    }

    fn sign(&self, secret: &SecretMaterial, payload: &[u8]) -> Result<Signature> {
        let keypair = Self::keypair(secret).map_err(|e| Error::Signing(e.to_string()))?;
        Ok(keypair.sign_message(payload))
    }

    fn export_secret(&self, secret: &SecretMaterial) -> Zeroizing<String> {
        Zeroizing::new(bs58::encode(secret.expose()).into_string())
    }

    fn restore_identity(&self, encoded: &str) -> Result<(Pubkey, SecretMaterial)> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| Error::InvalidKeypair(format!("Invalid base58 secret: {}", e)))?;
        let secret = SecretMaterial::new(bytes);
        let keypair = Self::keypair(&secret)?;
        Ok((keypair.pubkey(), secret))
    }
}
