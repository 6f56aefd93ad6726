use std::sync::Arc;

use axum::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::{AuthManager, CredentialDescriptor};
use crate::error::AppError;

/// Header carrying an issued token on authenticated requests.
pub const TOKEN_HEADER: &str = "jwetoken";

/// The credential recovered from the request's `jweToken` header.
pub struct Credential(pub CredentialDescriptor);

#[async_trait]
impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let manager = parts
            .extensions
            .get::<Arc<AuthManager>>()
            .cloned()
            .ok_or_else(|| AppError::Internal("auth manager extension missing".into()))?;
        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::NoAuthToken)?;
        Ok(Credential(manager.decrypt(token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwe::test_keys::PRIMARY;
    use crate::auth::{AccessCheckError, AccessChecker, KeyHolder, TokenManager};
    use axum::http::Request;

    struct AllowAll;

    #[async_trait]
    impl AccessChecker for AllowAll {
        async fn has_access(&self, _: &CredentialDescriptor) -> Result<(), AccessCheckError> {
            Ok(())
        }
    }

    fn manager() -> Arc<AuthManager> {
        let holder = Arc::new(KeyHolder::from_key(PRIMARY.clone()));
        Arc::new(AuthManager::new(
            Arc::new(AllowAll),
            Arc::new(TokenManager::new(holder)),
        ))
    }

    fn parts(token: Option<&str>, manager: Arc<AuthManager>) -> Parts {
        let mut builder = Request::builder().extension(manager);
        if let Some(token) = token {
            builder = builder.header("jweToken", token);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn credential_decrypted_from_header() {
        let manager = manager();
        let response = manager
            .login(&crate::auth::LoginSpec {
                token: "abc".into(),
            })
            .await
            .unwrap();
        let token = response.token.unwrap();
        let mut parts = parts(Some(&token), manager);
        let Credential(credential) = Credential::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(credential, CredentialDescriptor::bearer("abc"));
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let mut parts = parts(None, manager());
        let res = Credential::from_request_parts(&mut parts, &()).await;
        assert!(matches!(res, Err(AppError::NoAuthToken)));
    }

    #[tokio::test]
    async fn garbage_token_rejected() {
        let mut parts = parts(Some("invalid"), manager());
        let res = Credential::from_request_parts(&mut parts, &()).await;
        assert!(matches!(res, Err(AppError::InvalidAuthToken)));
    }
}
