use std::sync::Arc;

use async_trait::async_trait;
use authgate::auth::{
    AccessCheckError, AccessChecker, AuthManager, CredentialDescriptor, KeyHolder, TokenManager,
};
use authgate::login::Alert;
use authgate::routes::api_routes;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rsa::RsaPrivateKey;
use tower::ServiceExt;

static KEY: Lazy<RsaPrivateKey> = Lazy::new(|| KeyHolder::new().unwrap().key().as_ref().clone());

struct StaticChecker(Result<(), AccessCheckError>);

#[async_trait]
impl AccessChecker for StaticChecker {
    async fn has_access(&self, _: &CredentialDescriptor) -> Result<(), AccessCheckError> {
        self.0.clone()
    }
}

fn tokens() -> Arc<TokenManager> {
    Arc::new(TokenManager::new(Arc::new(KeyHolder::from_key(KEY.clone()))))
}

fn app_with(check: Result<(), AccessCheckError>, tokens: Arc<TokenManager>) -> Router {
    let auth = Arc::new(AuthManager::new(Arc::new(StaticChecker(check)), tokens));
    api_routes().layer(Extension(auth))
}

fn app(check: Result<(), AccessCheckError>) -> Router {
    app_with(check, tokens())
}

fn login_request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/v1/login");
    if let Some(value) = authorization {
        builder = builder.header("Authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

fn refresh_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/token/refresh")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({ "jweToken": token }).to_string(),
        ))
        .unwrap()
}

async fn alert(response: Response) -> Alert {
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn login_issues_token_usable_for_session_and_refresh() {
    let app = app(Ok(()));

    let response = app
        .clone()
        .oneshot(login_request(Some("Bearer abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued = alert(response).await;
    assert_eq!(issued.alert_message, "login_success");
    assert!(!issued.token.is_empty());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/session")
                .header("jweToken", issued.token.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let session: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(session["authenticated"], true);

    let response = app.oneshot(refresh_request(&issued.token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = alert(response).await;
    assert_eq!(refreshed.alert_message, "token_refreshed");
    assert!(!refreshed.token.is_empty());
}

#[tokio::test]
async fn login_without_header_is_unauthorized() {
    let response = app(Ok(())).oneshot(login_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = alert(response).await;
    assert_eq!(body.alert_type, "error");
    assert_eq!(body.alert_message, "no_auth_token");
    assert_eq!(body.token, "");
}

#[tokio::test]
async fn login_with_malformed_header_is_unauthorized() {
    let response = app(Ok(()))
        .oneshot(login_request(Some("Basic abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(alert(response).await.alert_message, "invalid_auth_token");
}

#[tokio::test]
async fn login_denied_by_cluster_keeps_status() {
    let denied = Err(AccessCheckError::Status {
        code: 403,
        message: "forbidden".into(),
    });
    let response = app(denied)
        .oneshot(login_request(Some("Bearer abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(alert(response).await.alert_message, "access_denied");
}

#[tokio::test]
async fn login_during_cluster_outage_is_server_error() {
    let outage = Err(AccessCheckError::Transport("connection refused".into()));
    let response = app(outage)
        .oneshot(login_request(Some("Bearer abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn refresh_rejects_expired_and_invalid_tokens() {
    let tokens = tokens();
    let stale = tokens
        .generate_at(
            &CredentialDescriptor::bearer("abc"),
            Utc::now() - Duration::hours(2),
        )
        .unwrap();
    let app = app_with(Ok(()), tokens);

    let response = app.clone().oneshot(refresh_request(&stale)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(alert(response).await.alert_message, "token_expired");

    let response = app.oneshot(refresh_request("garbage")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(alert(response).await.alert_message, "invalid_auth_token");
}

#[tokio::test]
async fn session_without_token_is_unauthorized() {
    let response = app(Ok(()))
        .oneshot(
            Request::builder()
                .uri("/api/v1/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metrics_served_alongside_api() {
    let (layer, handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/metrics", get(move || async move { handle.render() }))
        .merge(app(Ok(())))
        .layer(layer);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
