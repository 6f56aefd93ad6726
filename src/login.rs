use std::sync::Arc;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthManager, LoginSpec};
use crate::error::{AppError, AppResult};
use crate::extractor::Credential;

pub const LOGIN_SUCCESS: &str = "login_success";
pub const TOKEN_REFRESHED: &str = "token_refreshed";

/// Response body shared by every auth endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub alert_type: String,
    pub alert_message: String,
    pub token: String,
}

impl Alert {
    pub fn info(message: &str, token: String) -> Self {
        Self {
            alert_type: "info".into(),
            alert_message: message.into(),
            token,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            alert_type: "error".into(),
            alert_message: message,
            token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshSpec {
    pub jwe_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub impersonate_groups: Vec<String>,
}

/// Exchanges the caller's bearer token for an encrypted session token once
/// the cluster accepts it.
pub async fn login(
    Extension(auth): Extension<Arc<AuthManager>>,
    headers: HeaderMap,
) -> AppResult<Json<Alert>> {
    let token = bearer_token(&headers)?;
    let response = auth.login(&LoginSpec { token }).await?;
    if let Some(rejection) = response.error {
        return Err(AppError::Denied(rejection));
    }
    let token = response
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Internal("login returned no token".into()))?;
    Ok(Json(Alert::info(LOGIN_SUCCESS, token)))
}

pub async fn refresh_token(
    Extension(auth): Extension<Arc<AuthManager>>,
    Json(spec): Json<TokenRefreshSpec>,
) -> AppResult<Json<Alert>> {
    let token = spec.jwe_token.trim();
    if token.is_empty() {
        return Err(AppError::NoAuthToken);
    }
    let refreshed = auth.refresh(token)?;
    Ok(Json(Alert::info(TOKEN_REFRESHED, refreshed)))
}

pub async fn session(Credential(credential): Credential) -> Json<SessionInfo> {
    Json(SessionInfo {
        authenticated: true,
        impersonate: credential.impersonate,
        impersonate_groups: credential.impersonate_groups,
    })
}

/// Reads `Authorization: Bearer <token>`. An absent or empty header is
/// `NoAuthToken`; anything else that is not a bearer token is
/// `InvalidAuthToken`.
fn bearer_token(headers: &HeaderMap) -> AppResult<String> {
    let raw = headers
        .get(AUTHORIZATION)
        .ok_or(AppError::NoAuthToken)?
        .to_str()
        .map_err(|_| AppError::InvalidAuthToken)?;
    if raw.is_empty() {
        return Err(AppError::NoAuthToken);
    }
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AppError::InvalidAuthToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsed() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn missing_or_empty_header_is_no_token() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AppError::NoAuthToken)
        ));
        assert!(matches!(
            bearer_token(&headers("")),
            Err(AppError::NoAuthToken)
        ));
    }

    #[test]
    fn malformed_header_is_invalid() {
        for value in ["Bearer", "Bearer ", "Basic abc", "abc"] {
            assert!(
                matches!(bearer_token(&headers(value)), Err(AppError::InvalidAuthToken)),
                "{value:?}"
            );
        }
    }

    #[test]
    fn alert_serializes_camel_case() {
        let json = serde_json::to_value(Alert::info(LOGIN_SUCCESS, "t".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"alertType": "info", "alertMessage": "login_success", "token": "t"})
        );
    }
}
