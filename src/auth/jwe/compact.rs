use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand_core::{OsRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::TokenError;

pub const KEY_ALGORITHM: &str = "RSA-OAEP-256";
pub const CONTENT_ENCRYPTION: &str = "A256GCM";

const CONTENT_KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    enc: String,
}

/// Encrypts `plaintext` for `public_key`, returning
/// `header.encrypted_key.iv.ciphertext.tag`.
pub fn encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<String, TokenError> {
    let header = Header {
        alg: KEY_ALGORITHM.to_string(),
        enc: CONTENT_ENCRYPTION.to_string(),
    };
    let header_json = serde_json::to_vec(&header).map_err(TokenError::Encoding)?;
    let encoded_header = URL_SAFE_NO_PAD.encode(header_json);

    let mut content_key = [0u8; CONTENT_KEY_LEN];
    OsRng.fill_bytes(&mut content_key);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &content_key)
        .map_err(|err| TokenError::Encryption(format!("key wrap failed: {err}")))?;

    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|_| TokenError::Encryption("invalid content key length".into()))?;
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: encoded_header.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Encryption("content encryption failed".into()))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok([
        encoded_header,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ]
    .join("."))
}

/// Reverses [`encrypt`]. Every structural, cryptographic or key-mismatch
/// failure is reported as `TokenError::Decryption`.
pub fn decrypt(private_key: &RsaPrivateKey, token: &str) -> Result<Vec<u8>, TokenError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    let [encoded_header, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
        return Err(TokenError::Decryption(format!(
            "expected 5 segments, found {}",
            segments.len()
        )));
    };

    let header: Header = serde_json::from_slice(&decode_segment("header", encoded_header)?)
        .map_err(|err| TokenError::Decryption(format!("malformed header: {err}")))?;
    if header.alg != KEY_ALGORITHM || header.enc != CONTENT_ENCRYPTION {
        return Err(TokenError::Decryption(format!(
            "unsupported algorithms {}/{}",
            header.alg, header.enc
        )));
    }

    let encrypted_key = decode_segment("encrypted key", encrypted_key)?;
    let iv = decode_segment("iv", iv)?;
    let mut sealed = decode_segment("ciphertext", ciphertext)?;
    let tag = decode_segment("tag", tag)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(TokenError::Decryption("invalid iv or tag length".into()));
    }

    let content_key = private_key
        .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
        .map_err(|_| TokenError::Decryption("key unwrap failed".into()))?;
    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|_| TokenError::Decryption("invalid content key length".into()))?;

    sealed.extend_from_slice(&tag);
    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: encoded_header.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Decryption("authentication tag mismatch".into()))
}

fn decode_segment(label: &str, segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| TokenError::Decryption(format!("invalid {label} encoding: {err}")))
}
