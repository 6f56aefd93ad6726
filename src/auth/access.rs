use async_trait::async_trait;
use kube::config::AuthInfo;
use secrecy::SecretString;

use super::api::{AccessCheckError, AccessChecker, CredentialDescriptor};

/// Checks a credential by calling the API server with it as the only
/// identity.
#[derive(Clone)]
pub struct KubeAccessChecker {
    base: kube::Config,
}

impl KubeAccessChecker {
    /// `base` supplies the cluster endpoint and TLS settings; its own
    /// credentials are discarded for every check.
    pub fn new(base: kube::Config) -> Self {
        Self { base }
    }

    pub async fn infer() -> Result<Self, kube::config::InferConfigError> {
        Ok(Self::new(kube::Config::infer().await?))
    }

    fn config_for(&self, credential: &CredentialDescriptor) -> kube::Config {
        let mut config = self.base.clone();
        config.auth_info = AuthInfo {
            token: credential.token.clone().map(SecretString::new),
            impersonate: credential.impersonate.clone(),
            impersonate_groups: (!credential.impersonate_groups.is_empty())
                .then(|| credential.impersonate_groups.clone()),
            ..AuthInfo::default()
        };
        config
    }
}

#[async_trait]
impl AccessChecker for KubeAccessChecker {
    async fn has_access(&self, credential: &CredentialDescriptor) -> Result<(), AccessCheckError> {
        let client = kube::Client::try_from(self.config_for(credential))
            .map_err(|err| AccessCheckError::Transport(err.to_string()))?;
        client
            .apiserver_version()
            .await
            .map(|_| ())
            .map_err(access_error)
    }
}

fn access_error(err: kube::Error) -> AccessCheckError {
    match err {
        kube::Error::Api(response) => AccessCheckError::Status {
            code: response.code,
            message: response.message,
        },
        other => AccessCheckError::Transport(other.to_string()),
    }
}
