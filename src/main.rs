use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use authgate::auth::{AuthManager, KeyHolder, KubeAccessChecker, TokenManager};
use authgate::config::{self, SecretStoreDriver};
use authgate::routes::api_routes;
use authgate::sync::{KubeSecretStore, MemorySecretStore, SecretStore, Synchronizer};
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use tracing_subscriber::{fmt, EnvFilter};

async fn root() -> &'static str {
    "authgate"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast on an unusable store selection
    let driver = config::secret_store_driver_from_env()?;

    let key_holder = Arc::new(KeyHolder::new().context("failed to generate encryption key")?);
    let tokens = Arc::new(TokenManager::new(key_holder.clone()));
    tokens.set_token_ttl(Duration::from_secs(*config::TOKEN_TTL_SECS));

    let store: Arc<dyn SecretStore> = match driver {
        SecretStoreDriver::Kubernetes => Arc::new(
            KubeSecretStore::try_default()
                .await
                .context("failed to connect to the cluster for key storage")?,
        ),
        SecretStoreDriver::Memory => {
            tracing::warn!("encryption key is kept in memory; replicas will not share it");
            Arc::new(MemorySecretStore::new())
        }
    };
    tokio::spawn(supervise_key_sync(store, key_holder));

    let access = KubeAccessChecker::infer()
        .await
        .context("failed to load cluster configuration")?;
    let auth = Arc::new(AuthManager::new(Arc::new(access), tokens));

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(auth));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("invalid bind address")?;
    tracing::info!(%addr, store = driver.as_str(), "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Keeps a key synchronizer running for the life of the process. A
/// synchronizer that reports a failure is stopped and replaced after
/// `SYNC_RESTART_BACKOFF_SECS`.
async fn supervise_key_sync(store: Arc<dyn SecretStore>, key_holder: Arc<KeyHolder>) {
    let interval = Duration::from_secs(*config::SECRET_SYNC_INTERVAL_SECS);
    let backoff = Duration::from_secs(*config::SYNC_RESTART_BACKOFF_SECS);
    loop {
        let synchronizer = Synchronizer::with_interval(
            store.clone(),
            config::KEY_SECRET_NAMESPACE.as_str(),
            config::KEY_SECRET_NAME.as_str(),
            interval,
        );
        key_holder.attach(&synchronizer);
        match synchronizer.start() {
            Ok(mut errors) => {
                if let Some(err) = errors.recv().await {
                    tracing::warn!(%err, "key synchronizer failed");
                }
            }
            Err(err) => tracing::error!(%err, "failed to start key synchronizer"),
        }
        synchronizer.stop();
        tracing::info!(backoff_secs = backoff.as_secs(), "restarting key synchronizer");
        tokio::time::sleep(backoff).await;
    }
}
