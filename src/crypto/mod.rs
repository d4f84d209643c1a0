//! Cryptographic functions for Rollcall
//!
//! Provides AES-256-GCM encryption of artifact payloads with Argon2id key
//! derivation from an operator passphrase.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{decrypt, encrypt, Sealed};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::SecureString;
