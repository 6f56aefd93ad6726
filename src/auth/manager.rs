use std::sync::Arc;

use tracing::{error, info, warn};

use super::api::{
    AccessCheckError, AccessChecker, AuthError, AuthResponse, Authenticator, CredentialDescriptor,
    LoginError, LoginSpec,
};
use super::jwe::{TokenError, TokenManager};
use super::token_authenticator::TokenAuthenticator;

const UNAUTHORIZED: u16 = 401;
const FORBIDDEN: u16 = 403;

/// Orchestrates login, token decryption and refresh.
///
/// Access-check failures are split in two: 401/403 are returned inside the
/// `AuthResponse` as an `AuthError`, anything else propagates as
/// `LoginError::Critical`.
pub struct AuthManager {
    access: Arc<dyn AccessChecker>,
    tokens: Arc<TokenManager>,
}

impl AuthManager {
    pub fn new(access: Arc<dyn AccessChecker>, tokens: Arc<TokenManager>) -> Self {
        Self { access, tokens }
    }

    pub async fn login(&self, spec: &LoginSpec) -> Result<AuthResponse, LoginError> {
        let authenticator = authenticator_for(spec)?;
        let credential = authenticator.credential()?;

        if let Err(err) = self.access.has_access(&credential).await {
            return match classify(err) {
                Ok(rejection) => {
                    warn!(code = rejection.code, "login rejected by access check");
                    Ok(AuthResponse {
                        token: None,
                        error: Some(rejection),
                    })
                }
                Err(err) => {
                    error!(%err, "access check failed during login");
                    Err(LoginError::Critical(err))
                }
            };
        }

        let token = self.tokens.generate(&credential)?;
        info!("login succeeded; token issued");
        Ok(AuthResponse {
            token: Some(token),
            error: None,
        })
    }

    pub fn decrypt(&self, token: &str) -> Result<CredentialDescriptor, TokenError> {
        self.tokens.decrypt(token)
    }

    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        self.tokens.refresh(token)
    }
}

/// Picks the authenticator matching `spec`. Only bearer tokens are supported.
fn authenticator_for(spec: &LoginSpec) -> Result<Box<dyn Authenticator>, LoginError> {
    if spec.token.trim().is_empty() {
        return Err(LoginError::UnsupportedSpec);
    }
    Ok(Box::new(TokenAuthenticator::new(spec)))
}

/// `Ok` for recoverable rejections (401, 403), `Err` for everything else.
pub fn classify(err: AccessCheckError) -> Result<AuthError, AccessCheckError> {
    match err.status_code() {
        Some(code @ (UNAUTHORIZED | FORBIDDEN)) => Ok(AuthError { code, cause: err }),
        _ => Err(err),
    }
}
