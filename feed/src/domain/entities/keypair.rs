//! Ed25519 keypairs for payers, authors and new accounts

use ed25519_dalek::{Signer, SigningKey, KEYPAIR_LENGTH};
use rand::rngs::OsRng;

use super::address::{Address, Signature};
use crate::error::KeyError;

/// An ed25519 keypair; its public key is an account address
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    /// Restore from the 64-byte `secret || public` encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: &[u8; KEYPAIR_LENGTH] = bytes.try_into().map_err(|_| KeyError::Length {
            expected: KEYPAIR_LENGTH,
            actual: bytes.len(),
        })?;
        SigningKey::from_keypair_bytes(bytes)
            .map(Self)
            .map_err(|e| KeyError::Keypair(e.to_string()))
    }

    /// Restore from the hex form returned by the login endpoint
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::Hex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.0.to_keypair_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn address(&self) -> Address {
        Address::new(self.0.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::new(self.0.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Keypair").field(&self.address()).finish()
    }
}
