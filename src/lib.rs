pub mod auth;
pub mod config;
pub mod error;
pub mod extractor;
pub mod login;
pub mod routes;
pub mod sync;

pub use config::{SecretStoreDriver, KEY_SECRET_NAME, KEY_SECRET_NAMESPACE};
