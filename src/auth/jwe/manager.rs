use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{compact, KeyHolder, TokenError};
use crate::auth::api::{CredentialDescriptor, DEFAULT_TOKEN_TTL_SECS};

#[derive(Serialize)]
struct ClaimsRef<'a> {
    #[serde(rename = "authInfo")]
    auth_info: &'a CredentialDescriptor,
    iat: i64,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(rename = "authInfo")]
    auth_info: CredentialDescriptor,
    iat: i64,
}

/// Issues and opens encrypted tokens carrying a credential descriptor.
///
/// Only the issue time is embedded; expiry is evaluated on every read as
/// `iat + ttl`, so changing the TTL re-scopes every outstanding token. A TTL
/// of zero disables expiry.
pub struct TokenManager {
    key_holder: Arc<KeyHolder>,
    ttl_secs: AtomicU64,
}

impl TokenManager {
    pub fn new(key_holder: Arc<KeyHolder>) -> Self {
        Self {
            key_holder,
            ttl_secs: AtomicU64::new(DEFAULT_TOKEN_TTL_SECS),
        }
    }

    pub fn generate(&self, credential: &CredentialDescriptor) -> Result<String, TokenError> {
        self.generate_at(credential, Utc::now())
    }

    pub fn generate_at(
        &self,
        credential: &CredentialDescriptor,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = ClaimsRef {
            auth_info: credential,
            iat: now.timestamp(),
        };
        let payload = serde_json::to_vec(&claims).map_err(TokenError::Encoding)?;
        self.key_holder.encrypter().encrypt(&payload)
    }

    pub fn decrypt(&self, token: &str) -> Result<CredentialDescriptor, TokenError> {
        self.decrypt_at(token, Utc::now())
    }

    pub fn decrypt_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<CredentialDescriptor, TokenError> {
        let claims = self.open(token)?;
        self.ensure_fresh(&claims, now)?;
        Ok(claims.auth_info)
    }

    /// Re-issues a still-valid token with a new issue time. Expired tokens are
    /// never refreshed.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        self.refresh_at(token, Utc::now())
    }

    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = self.open(token)?;
        self.ensure_fresh(&claims, now)?;
        self.generate_at(&claims.auth_info, now)
    }

    /// Tokens carry whole-second issue times, so a fractional TTL is rounded
    /// up. Only `Duration::ZERO` disables expiry.
    pub fn set_token_ttl(&self, ttl: Duration) {
        let secs = ttl
            .as_secs()
            .saturating_add(u64::from(ttl.subsec_nanos() > 0));
        self.ttl_secs.store(secs, Ordering::Relaxed);
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.load(Ordering::Relaxed))
    }

    fn open(&self, token: &str) -> Result<Claims, TokenError> {
        let key = self.key_holder.key();
        let payload = compact::decrypt(&key, token)?;
        serde_json::from_slice(&payload)
            .map_err(|err| TokenError::Decryption(format!("malformed payload: {err}")))
    }

    fn ensure_fresh(&self, claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenError> {
        let ttl = self.ttl_secs.load(Ordering::Relaxed);
        if ttl == 0 {
            return Ok(());
        }
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
        if now.timestamp().saturating_sub(claims.iat) > ttl {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}
