use once_cell::sync::Lazy;

use crate::auth::DEFAULT_TOKEN_TTL_SECS;

/// Token validity window in seconds. Defaults to `900`; `0` disables expiry.
pub static TOKEN_TTL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("TOKEN_TTL_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
});

/// Seconds between polls of the key secret. Defaults to `300`.
pub static SECRET_SYNC_INTERVAL_SECS: Lazy<u64> =
    Lazy::new(|| positive_secs_from_env("SECRET_SYNC_INTERVAL_SECS", 300));

/// Delay before a failed key synchronizer is replaced. Defaults to `10`.
pub static SYNC_RESTART_BACKOFF_SECS: Lazy<u64> =
    Lazy::new(|| positive_secs_from_env("SYNC_RESTART_BACKOFF_SECS", 10));

/// Namespace of the secret holding the encryption key. Defaults to `default`.
pub static KEY_SECRET_NAMESPACE: Lazy<String> = Lazy::new(|| {
    read_optional_env("KEY_SECRET_NAMESPACE").unwrap_or_else(|| "default".to_string())
});

/// Name of the secret holding the encryption key.
pub static KEY_SECRET_NAME: Lazy<String> = Lazy::new(|| {
    read_optional_env("KEY_SECRET_NAME").unwrap_or_else(|| "authgate-key-holder".to_string())
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `8080`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080)
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStoreDriver {
    Kubernetes,
    Memory,
}

impl SecretStoreDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretStoreDriver::Kubernetes => "kubernetes",
            SecretStoreDriver::Memory => "memory",
        }
    }
}

pub fn parse_secret_store_driver(raw: Option<&str>) -> anyhow::Result<SecretStoreDriver> {
    let normalized = raw.map(|value| value.trim().to_ascii_lowercase());
    match normalized.as_deref() {
        None | Some("") | Some("kubernetes") => Ok(SecretStoreDriver::Kubernetes),
        Some("memory") => Ok(SecretStoreDriver::Memory),
        Some(other) => anyhow::bail!(
            "unsupported KEY_SECRET_STORE value '{other}'; expected 'kubernetes' or 'memory'"
        ),
    }
}

/// Where the encryption key secret is kept (`KEY_SECRET_STORE`).
pub fn secret_store_driver_from_env() -> anyhow::Result<SecretStoreDriver> {
    parse_secret_store_driver(std::env::var("KEY_SECRET_STORE").ok().as_deref())
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn positive_secs_from_env(key: &str, default: u64) -> u64 {
    parse_positive_secs(read_optional_env(key).as_deref(), default)
}

fn parse_positive_secs(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
