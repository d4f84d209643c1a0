//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for artifact payloads. Each encryption
//! generates a fresh nonce; the nonce travels in the artifact header
//! (base64) and the ciphertext forms the payload.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{VaultError, VaultResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Algorithm label recorded in artifact headers
pub const ALGORITHM: &str = "aes-256-gcm";

/// Ciphertext plus the nonce that produced it
#[derive(Debug, Clone)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the authentication tag appended
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Nonce in the base64 form stored in headers
    pub fn nonce_b64(&self) -> String {
        STANDARD.encode(self.nonce)
    }
}

/// Encrypt plaintext using AES-256-GCM with a random nonce
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> VaultResult<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(Sealed {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a payload given the header's base64 nonce
pub fn decrypt(nonce_b64: &str, ciphertext: &[u8], key: &DerivedKey) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let nonce_bytes = STANDARD
        .decode(nonce_b64)
        .map_err(|e| VaultError::Encryption(format!("Invalid nonce encoding: {}", e)))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        VaultError::Encryption("Decryption failed: invalid key or corrupted data".to_string())
    })
}
