// src/authenticator.rs

use crate::config::{Config, RoleSource};
use crate::error::AuthError;
use crate::identity::Identity;
use crate::store::KeyStore;
use crate::validator::TokenValidator;
use tracing::instrument;

/// The middleware-facing entry point: raw bearer token in, verified
/// [`Identity`] out.
///
/// Create one per identity provider and reuse it for all requests; clones
/// share the underlying key store.
#[derive(Clone)]
pub struct Authenticator {
    validator: TokenValidator,
    role_source: RoleSource,
}

impl Authenticator {
    /// Builds an authenticator whose key store fetches keys from the
    /// provider described by the configuration.
    pub fn new(config: Config) -> Self {
        let key_store = KeyStore::from_config(&config);
        Self::with_key_store(config, key_store)
    }

    /// Builds an authenticator over an injected key store. Lets tests and
    /// fixed-key deployments bypass remote fetching.
    pub fn with_key_store(config: Config, key_store: KeyStore) -> Self {
        let role_source = config.role_source.clone();
        Self {
            validator: TokenValidator::new(&config, key_store),
            role_source,
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        self.validator.key_store()
    }

    /// Verifies the presented bearer token and derives the request identity.
    ///
    /// Accepts either the bare compact token or a full `Authorization`
    /// header value with the `Bearer` scheme still attached. Any failure is
    /// a typed [`AuthError`]; use [`AuthError::external_message`] for the
    /// client-facing response.
    #[instrument(skip(self, bearer), err)]
    pub async fn authenticate(&self, bearer: &str) -> Result<Identity, AuthError> {
        let token = strip_bearer_scheme(bearer);
        let claims = self.validator.verify(token).await?;
        Identity::from_claims(&claims, &self.role_source)
    }
}

/// Drops an HTTP `Bearer` auth-scheme prefix if one is present. The scheme
/// name is case-insensitive; a bare token has no spaces and passes through.
fn strip_bearer_scheme(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => trimmed,
    }
}
