use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::auth::{AuthError, LoginError, TokenError};
use crate::login::Alert;

/// Rejections rendered by the HTTP boundary. Missing or malformed
/// credentials, expired tokens, access denials and outages stay distinct.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no_auth_token")]
    NoAuthToken,
    #[error("invalid_auth_token")]
    InvalidAuthToken,
    #[error("token_expired")]
    TokenExpired,
    #[error("access_denied")]
    Denied(#[source] AuthError),
    #[error("server_error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoAuthToken | AppError::InvalidAuthToken | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Denied(rejection) => {
                StatusCode::from_u16(rejection.code).unwrap_or(StatusCode::FORBIDDEN)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Decryption(_) => AppError::InvalidAuthToken,
            TokenError::Encoding(_) | TokenError::Encryption(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<LoginError> for AppError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::UnsupportedSpec => AppError::InvalidAuthToken,
            LoginError::Token(err) => err.into(),
            LoginError::Critical(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(?self);
        } else {
            tracing::debug!(?self, "request rejected");
        }
        (status, Json(Alert::error(self.to_string()))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
