// src/config.rs

use crate::error::AuthError;
use jsonwebtoken::Algorithm;
use std::time::Duration;
use url::Url;

/// Audience handling for token verification.
///
/// The provider this library was written against stamps a default audience
/// (`account`) on every token, which deployments frequently do not care
/// about. Rather than silently accepting any audience, the policy is an
/// explicit choice: ignore the claim entirely, or pin the acceptable values.
#[derive(Debug, Clone, Default)]
pub enum AudiencePolicy {
    /// The `aud` claim is not inspected.
    #[default]
    Ignore,
    /// The `aud` claim must contain at least one of these values. A token
    /// without an `aud` claim is rejected.
    Expect(Vec<String>),
}

/// Where role names live inside the verified claim set.
///
/// Identity providers nest roles under provider-specific containers; which
/// one applies is deployment configuration, not something the library can
/// guess.
#[derive(Debug, Clone, Default)]
pub enum RoleSource {
    /// Realm-level roles: `realm_access.roles`.
    #[default]
    RealmRoles,
    /// Client-level roles for the named client:
    /// `resource_access.<client>.roles`.
    ClientRoles(String),
    /// An arbitrary claim path ending in a list of role names, for providers
    /// using neither container above. The path is matched against claims
    /// outside the two built-in containers.
    ClaimPath(Vec<String>),
}

/// The per-token verification checks.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Signing algorithms permitted in the token header. Tokens declaring
    /// any other algorithm are rejected before key resolution.
    pub algorithms: Vec<Algorithm>,
    /// Clock-skew tolerance applied to `exp` and `nbf`.
    pub leeway: Duration,
    /// Audience handling.
    pub audience: AudiencePolicy,
    /// Whether the `iss` claim must equal the configured issuer URL.
    pub verify_issuer: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            // RS256 is what the target providers sign with by default.
            algorithms: vec![Algorithm::RS256],
            leeway: Duration::from_secs(60),
            audience: AudiencePolicy::Ignore,
            verify_issuer: true,
        }
    }
}

/// The full configuration for an [`crate::Authenticator`].
///
/// Construct via [`ConfigBuilder`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The identity provider's issuer URL. Used for discovery of the key-set
    /// endpoint and, unless disabled, to check the `iss` claim.
    pub issuer_url: Url,
    /// Explicit key-set endpoint, bypassing discovery.
    pub jwks_uri: Option<Url>,
    /// The verification checks applied to each token.
    pub verification: VerificationPolicy,
    /// How long a fetched key set stays fresh before the next lookup
    /// triggers a refetch.
    pub cache_ttl: Duration,
    /// Minimum interval between forced refreshes triggered by unknown-key
    /// misses. Bounds the rate at which garbage tokens can cause remote
    /// fetches.
    pub refresh_cooldown: Duration,
    /// Upper bound on any single key-set fetch.
    pub fetch_timeout: Duration,
    /// Where to read role names from when building an identity.
    pub role_source: RoleSource,
}

/// Fluent builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    issuer_url: Option<Url>,
    jwks_uri: Option<Url>,
    verification: VerificationPolicy,
    cache_ttl: Option<Duration>,
    refresh_cooldown: Option<Duration>,
    fetch_timeout: Option<Duration>,
    role_source: RoleSource,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer URL of the identity provider. Required.
    pub fn issuer_url(mut self, url: &str) -> Result<Self, AuthError> {
        let parsed = Url::parse(url).map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
        self.issuer_url = Some(parsed);
        Ok(self)
    }

    /// Sets an explicit key-set endpoint, bypassing OIDC discovery.
    pub fn jwks_uri(mut self, url: &str) -> Result<Self, AuthError> {
        let parsed = Url::parse(url).map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
        self.jwks_uri = Some(parsed);
        Ok(self)
    }

    /// Sets the accepted signing algorithms. Defaults to `[RS256]`.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.verification.algorithms = algorithms;
        self
    }

    /// Sets the clock-skew tolerance. Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.verification.leeway = leeway;
        self
    }

    /// Requires the `aud` claim to contain one of the given values.
    /// Without this call the audience claim is ignored.
    pub fn expect_audience<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verification.audience =
            AudiencePolicy::Expect(audiences.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables the `iss` check. Defaults to enabled.
    pub fn verify_issuer(mut self, verify: bool) -> Self {
        self.verification.verify_issuer = verify;
        self
    }

    /// Sets how long a fetched key set stays fresh. Defaults to 5 minutes.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the minimum interval between miss-triggered forced refreshes.
    /// Defaults to 30 seconds.
    pub fn refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = Some(cooldown);
        self
    }

    /// Sets the per-fetch timeout. Defaults to 10 seconds.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Sets where role names are read from. Defaults to realm-level roles.
    pub fn role_source(mut self, source: RoleSource) -> Self {
        self.role_source = source;
        self
    }

    /// Consumes the builder and returns a `Config`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingConfiguration`] if `issuer_url` was never
    /// set, and [`AuthError::InvalidConfiguration`] for unusable values
    /// (an empty algorithm set, an empty expected-audience list).
    pub fn build(self) -> Result<Config, AuthError> {
        let issuer_url = self
            .issuer_url
            .ok_or_else(|| AuthError::MissingConfiguration("issuer_url".to_string()))?;

        if self.verification.algorithms.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "the accepted algorithm set must not be empty".to_string(),
            ));
        }
        if let AudiencePolicy::Expect(audiences) = &self.verification.audience {
            if audiences.is_empty() {
                return Err(AuthError::InvalidConfiguration(
                    "an expected audience list must not be empty".to_string(),
                ));
            }
        }

        Ok(Config {
            issuer_url,
            jwks_uri: self.jwks_uri,
            verification: self.verification,
            cache_ttl: self.cache_ttl.unwrap_or(Duration::from_secs(300)),
            refresh_cooldown: self.refresh_cooldown.unwrap_or(Duration::from_secs(30)),
            fetch_timeout: self.fetch_timeout.unwrap_or(Duration::from_secs(10)),
            role_source: self.role_source,
        })
    }
}
