//! Cryptographic building blocks for capsule federation
//!
//! Provides:
//! - Authenticated encryption (AES-256-GCM, fresh key and nonce per artifact)
//! - Key verification hashes with constant-time comparison
//! - The capability token codec (`{domain}/voice/{id}#{base64url(key)}`)

mod cipher;
mod token;
mod verify;

pub use cipher::*;
pub use token::*;
pub use verify::*;
