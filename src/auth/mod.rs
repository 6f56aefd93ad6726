//! Login orchestration and the encrypted token lifecycle.

pub mod access;
pub mod api;
pub mod jwe;
pub mod manager;
pub mod token_authenticator;

pub use access::KubeAccessChecker;
pub use api::{
    AccessCheckError, AccessChecker, AuthError, AuthResponse, Authenticator, CredentialDescriptor,
    LoginError, LoginSpec, DEFAULT_TOKEN_TTL_SECS,
};
pub use jwe::{KeyError, KeyHolder, TokenError, TokenManager};
pub use manager::AuthManager;
pub use token_authenticator::TokenAuthenticator;
