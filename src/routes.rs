use axum::{
    routing::{get, post},
    Router,
};

use crate::login::{login, refresh_token, session};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/v1/login", post(login))
        .route("/api/v1/token/refresh", post(refresh_token))
        .route("/api/v1/session", get(session))
}
