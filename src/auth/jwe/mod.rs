//! Encrypted token handling: the live RSA key pair and the token lifecycle
//! built on top of it.
//!
//! Tokens are JWE compact serializations using RSA-OAEP-256 for key
//! management and AES-256-GCM for content encryption.

pub mod compact;
pub mod key_holder;
pub mod manager;

use thiserror::Error;

pub use key_holder::{key_from_secret, key_to_secret, Encrypter, KeyError, KeyHolder};
pub use manager::TokenManager;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to encode token payload: {0}")]
    Encoding(#[source] serde_json::Error),
    #[error("failed to encrypt token: {0}")]
    Encryption(String),
    #[error("failed to decrypt token: {0}")]
    Decryption(String),
    #[error("token has expired")]
    Expired,
}
