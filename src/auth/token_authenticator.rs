use super::api::{Authenticator, CredentialDescriptor, LoginError, LoginSpec};

/// Authenticates with any bearer token accepted by the API server.
pub struct TokenAuthenticator {
    token: String,
}

impl TokenAuthenticator {
    pub fn new(spec: &LoginSpec) -> Self {
        Self {
            token: spec.token.clone(),
        }
    }
}

impl Authenticator for TokenAuthenticator {
    fn credential(&self) -> Result<CredentialDescriptor, LoginError> {
        Ok(CredentialDescriptor::bearer(self.token.clone()))
    }
}
