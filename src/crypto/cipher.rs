//! Authenticated cipher for capsule payloads.
//!
//! AES-256-GCM with a fresh 256-bit key and 96-bit nonce per artifact. The
//! output ciphertext carries the 16-byte tag at its end, so
//! `ciphertext.len() == plaintext.len() + TAG_SIZE`.
//!
//! Nonce reuse under one key is a caller precondition and is not checked at
//! runtime; every artifact gets its own single-use key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key size for AES-256 (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// 96-bit AES-GCM nonce
pub type Nonce96 = [u8; NONCE_SIZE];

/// Error type for cipher operations
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Tag verification failed: tampered ciphertext, wrong key or wrong nonce.
    #[error("integrity check failed")]
    Integrity,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Single-use symmetric key for one artifact. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ArtifactKey([u8; KEY_SIZE]);

impl ArtifactKey {
    /// Draw a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Copy key material from a slice; `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for ArtifactKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for ArtifactKey {}

impl fmt::Debug for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArtifactKey(<redacted>)")
    }
}

/// Output of [`encrypt`].
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub key: ArtifactKey,
    pub nonce: Nonce96,
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealed")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key", &self.key)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Generate a random 96-bit nonce
pub fn generate_nonce() -> Nonce96 {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under a freshly generated key and nonce.
pub fn encrypt(plaintext: &[u8]) -> Result<Sealed, CipherError> {
    let key = ArtifactKey::generate();
    let nonce = generate_nonce();
    let ciphertext = encrypt_with(&key, &nonce, plaintext)?;

    Ok(Sealed {
        ciphertext,
        key,
        nonce,
    })
}

/// Encrypt with caller-supplied key material.
///
/// The caller must never reuse `nonce` with the same `key`.
pub fn encrypt_with(
    key: &ArtifactKey,
    nonce: &Nonce96,
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CipherError::EncryptionFailed(e.to_string()))
}

/// Decrypt and authenticate.
///
/// Any failure (bad tag, wrong key or nonce, malformed lengths) yields
/// [`CipherError::Integrity`]; no partial plaintext is ever returned.
pub fn decrypt(ciphertext: &[u8], key: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CipherError> {
    if nonce.len() != NONCE_SIZE || ciphertext.len() < TAG_SIZE {
        return Err(CipherError::Integrity);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::Integrity)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::Integrity)
}
