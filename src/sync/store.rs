use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret already exists")]
    AlreadyExists,
    #[error("kubernetes error: {0}")]
    Kube(#[source] kube::Error),
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

/// Versioned secret storage keyed by namespace and name.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` means the secret does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError>;
}

/// Secrets held by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: kube::Client,
}

impl KubeSecretStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub async fn try_default() -> Result<Self, StoreError> {
        let client = kube::Client::try_default().await.map_err(StoreError::Kube)?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets.get_opt(name).await.map_err(StoreError::Kube)
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .create(&PostParams::default(), secret)
            .await
            .map_err(|err| match err {
                kube::Error::Api(response) if response.code == 409 => StoreError::AlreadyExists,
                other => StoreError::Kube(other),
            })
    }
}

/// Process-local store. Suitable for single-replica deployments and tests;
/// keys are not shared between processes.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<(String, String), Secret>>,
    version: AtomicU64,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a secret. Resource versions increase store-wide,
    /// so a recreated secret never reuses an older version.
    pub fn put(&self, namespace: &str, name: &str, mut secret: Secret) {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        secret.metadata.namespace = Some(namespace.to_string());
        secret.metadata.name = Some(name.to_string());
        secret.metadata.resource_version = Some(version.to_string());
        secrets.insert((namespace.to_string(), name.to_string()), secret);
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, StoreError> {
        let name = secret
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::Unavailable("secret has no name".into()))?;
        if self.get(namespace, &name).await?.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        self.put(namespace, &name, secret.clone());
        self.get(namespace, &name)
            .await?
            .ok_or_else(|| StoreError::Unavailable("secret vanished after create".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn named(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                "priv".to_string(),
                ByteString(b"value".to_vec()),
            )])),
            ..Secret::default()
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_and_reports_missing() {
        let store = MemorySecretStore::new();
        assert!(store.get("default", "keys").await.unwrap().is_none());

        let created = store.create("default", &named("keys")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(store.get("default", "keys").await.unwrap(), Some(created));
        assert!(store.get("other", "keys").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_create() {
        let store = MemorySecretStore::new();
        store.create("default", &named("keys")).await.unwrap();
        assert!(matches!(
            store.create("default", &named("keys")).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn put_bumps_resource_version() {
        let store = MemorySecretStore::new();
        store.put("default", "keys", named("keys"));
        store.put("default", "keys", named("keys"));
        let secret = store.get("default", "keys").await.unwrap().unwrap();
        assert_eq!(secret.metadata.resource_version.as_deref(), Some("2"));
        assert!(store.remove("default", "keys").is_some());

        store.put("default", "keys", named("keys"));
        let recreated = store.get("default", "keys").await.unwrap().unwrap();
        assert_eq!(recreated.metadata.resource_version.as_deref(), Some("3"));
    }
}
