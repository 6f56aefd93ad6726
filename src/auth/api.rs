use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::jwe::TokenError;

/// Default number of seconds an issued token stays valid.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

/// Identity proven by the caller at login. Embedded verbatim as the payload of
/// every token minted for it and handed back by `decrypt`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impersonate_groups: Vec<String>,
}

impl CredentialDescriptor {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDescriptor")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("impersonate", &self.impersonate)
            .field("impersonate_groups", &self.impersonate_groups)
            .finish()
    }
}

/// Extracted from the login request; carries everything needed to pick an
/// authenticator.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginSpec {
    /// Bearer token accepted by the cluster API server.
    #[serde(default)]
    pub token: String,
}

/// Produces a credential descriptor for one authentication method.
pub trait Authenticator: Send + Sync {
    fn credential(&self) -> Result<CredentialDescriptor, LoginError>;
}

/// Failure reported by the access-check capability.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AccessCheckError {
    #[error("access check returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("access check failed: {0}")]
    Transport(String),
}

impl AccessCheckError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AccessCheckError::Status { code, .. } => Some(*code),
            AccessCheckError::Transport(_) => None,
        }
    }
}

/// Verifies that a credential is accepted by the backing cluster.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn has_access(&self, credential: &CredentialDescriptor) -> Result<(), AccessCheckError>;
}

/// Non-critical login failure (401/403 from the access check). Returned inside
/// an `AuthResponse` rather than as an error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("authentication rejected with status {code}")]
pub struct AuthError {
    pub code: u16,
    #[source]
    pub cause: AccessCheckError,
}

/// Outcome of a login that did not fail critically. Exactly one of `token`
/// and `error` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub error: Option<AuthError>,
}

/// Critical login failure: the caller must treat it as a system fault.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("no authenticator accepts the supplied login spec")]
    UnsupportedSpec,
    #[error(transparent)]
    Critical(AccessCheckError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serializes_camel_case_and_skips_empty_fields() {
        let descriptor = CredentialDescriptor {
            token: Some("abc".into()),
            impersonate: None,
            impersonate_groups: vec!["ops".into()],
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"token": "abc", "impersonateGroups": ["ops"]})
        );
    }

    #[test]
    fn debug_output_redacts_bearer_token() {
        let rendered = format!("{:?}", CredentialDescriptor::bearer("s3cr3t"));
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn status_code_only_present_for_api_failures() {
        let status = AccessCheckError::Status {
            code: 403,
            message: "forbidden".into(),
        };
        assert_eq!(status.status_code(), Some(403));
        assert_eq!(AccessCheckError::Transport("reset".into()).status_code(), None);
    }
}
