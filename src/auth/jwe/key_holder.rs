use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{compact, TokenError};
use crate::sync::{EventKind, StoreError, SyncError, Synchronizer};

/// Secret data field holding the PKCS#1 PEM private key.
pub const PRIVATE_KEY_FIELD: &str = "priv";
/// Secret data field holding the PKCS#1 PEM public key.
pub const PUBLIC_KEY_FIELD: &str = "pub";

const KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to generate encryption key: {0}")]
    Generation(#[source] rsa::Error),
    #[error("failed to encode encryption key: {0}")]
    Encoding(String),
    #[error("secret does not hold a usable encryption key: {0}")]
    InvalidSecret(String),
}

/// Encrypts token payloads for one public key.
///
/// Content encryption is AES-GCM (256), key management RSA-OAEP-SHA256.
#[derive(Clone)]
pub struct Encrypter {
    public_key: RsaPublicKey,
}

impl Encrypter {
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, TokenError> {
        compact::encrypt(&self.public_key, plaintext)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

/// Owns the live RSA key pair used to encrypt and decrypt tokens and keeps it
/// in step with the synchronized secret.
///
/// The key is replaced wholesale, never mutated; readers hold the lock only
/// long enough to clone the pointer.
pub struct KeyHolder {
    key: RwLock<Arc<RsaPrivateKey>>,
    synchronizer: RwLock<Option<Synchronizer>>,
}

impl KeyHolder {
    /// Generates a fresh 2048-bit key pair. Failure here is fatal: the service
    /// cannot issue credentials without a key.
    pub fn new() -> Result<Self, KeyError> {
        let key = RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(KeyError::Generation)?;
        Ok(Self::from_key(key))
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        Self {
            key: RwLock::new(Arc::new(key)),
            synchronizer: RwLock::new(None),
        }
    }

    pub fn encrypter(&self) -> Encrypter {
        Encrypter {
            public_key: self.key().to_public_key(),
        }
    }

    pub fn key(&self) -> Arc<RsaPrivateKey> {
        Arc::clone(&self.key.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Binds the holder to `synchronizer`: synchronized keys are adopted as they
    /// are observed, and a missing secret is recreated from the live key.
    /// Replaces any previously attached synchronizer.
    pub fn attach(self: &Arc<Self>, synchronizer: &Synchronizer) {
        *self
            .synchronizer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(synchronizer.clone());

        for kind in [EventKind::Added, EventKind::Modified] {
            let holder = Arc::downgrade(self);
            synchronizer.register(kind, move |event| {
                if let (Some(holder), Some(secret)) = (holder.upgrade(), event.secret()) {
                    holder.adopt(secret);
                }
            });
        }

        let holder = Arc::downgrade(self);
        synchronizer.register(EventKind::Deleted, move |_| {
            let Some(holder) = holder.upgrade() else {
                return;
            };
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { holder.publish().await });
                }
                Err(_) => warn!("no runtime available to publish encryption key"),
            }
        });
    }

    /// Pulls the latest secret through the attached synchronizer and swaps in
    /// its key.
    pub async fn refresh(&self) {
        let Some(synchronizer) = self.synchronizer() else {
            debug!("key holder has no synchronizer attached; nothing to refresh");
            return;
        };
        synchronizer.refresh().await;
        if let Some(secret) = synchronizer.get() {
            self.adopt(&secret);
        }
    }

    /// Stores the live key in the synchronized secret. When another replica
    /// won the race to create it, adopts that replica's key instead.
    pub async fn publish(&self) {
        let Some(synchronizer) = self.synchronizer() else {
            return;
        };
        let secret = match key_to_secret(&self.key()) {
            Ok(secret) => secret,
            Err(err) => {
                warn!(%err, "failed to encode encryption key for publishing");
                return;
            }
        };
        match synchronizer.create(secret).await {
            Ok(()) => info!(name = %synchronizer.name(), "published encryption key"),
            Err(SyncError::Store(StoreError::AlreadyExists)) => {
                debug!(name = %synchronizer.name(), "encryption key already published; adopting it");
                self.refresh().await;
            }
            Err(err) => warn!(%err, name = %synchronizer.name(), "failed to publish encryption key"),
        }
    }

    fn synchronizer(&self) -> Option<Synchronizer> {
        self.synchronizer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn adopt(&self, secret: &Secret) -> bool {
        match key_from_secret(secret) {
            Ok(key) => self.swap(key),
            Err(err) => {
                warn!(%err, "ignoring synchronized secret");
                false
            }
        }
    }

    /// Installs `key` if it differs from the live one.
    pub(crate) fn swap(&self, key: RsaPrivateKey) -> bool {
        let mut current = self.key.write().unwrap_or_else(PoisonError::into_inner);
        if current.n() == key.n() && current.e() == key.e() {
            return false;
        }
        *current = Arc::new(key);
        drop(current);
        info!("encryption key replaced");
        true
    }
}

/// Encodes `key` as secret data under [`PRIVATE_KEY_FIELD`] and [`PUBLIC_KEY_FIELD`].
pub fn key_to_secret(key: &RsaPrivateKey) -> Result<Secret, KeyError> {
    let private_pem = key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|err| KeyError::Encoding(err.to_string()))?;
    let public_pem = key
        .to_public_key()
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|err| KeyError::Encoding(err.to_string()))?;

    let data = BTreeMap::from([
        (
            PRIVATE_KEY_FIELD.to_string(),
            ByteString(private_pem.as_bytes().to_vec()),
        ),
        (
            PUBLIC_KEY_FIELD.to_string(),
            ByteString(public_pem.into_bytes()),
        ),
    ]);
    Ok(Secret {
        data: Some(data),
        ..Secret::default()
    })
}

pub fn key_from_secret(secret: &Secret) -> Result<RsaPrivateKey, KeyError> {
    let pem = secret
        .data
        .as_ref()
        .and_then(|data| data.get(PRIVATE_KEY_FIELD))
        .ok_or_else(|| KeyError::InvalidSecret(format!("missing `{PRIVATE_KEY_FIELD}` field")))?;
    let pem = std::str::from_utf8(&pem.0)
        .map_err(|err| KeyError::InvalidSecret(format!("key is not utf-8: {err}")))?;
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|err| KeyError::InvalidSecret(err.to_string()))
}
