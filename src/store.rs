// src/store.rs

use crate::config::Config;
use crate::error::AuthError;
use crate::model::{DiscoveryDocument, Jwk, JwkSet};
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// One public signing key from the provider's key set.
///
/// Immutable once built; a replaced key set drops the whole previous
/// generation of these.
pub struct SigningKey {
    kid: String,
    kty: String,
    alg: Option<String>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Builds a verification key from a published JWK. Only RSA keys carry
    /// enough modeled material; an RSA key without its components is a
    /// malformed document.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, AuthError> {
        if jwk.kty != "RSA" {
            return Err(AuthError::InvalidKeyFormat(format!(
                "unsupported key type '{}'",
                jwk.kty
            )));
        }
        let n = jwk
            .n
            .as_ref()
            .ok_or_else(|| AuthError::InvalidKeyFormat("RSA key missing 'n'".to_string()))?;
        let e = jwk
            .e
            .as_ref()
            .ok_or_else(|| AuthError::InvalidKeyFormat("RSA key missing 'e'".to_string()))?;
        let decoding_key = DecodingKey::from_rsa_components(n, e)
            .map_err(|err| AuthError::InvalidKeyFormat(err.to_string()))?;

        Ok(Self {
            kid: jwk.kid.clone(),
            kty: jwk.kty.clone(),
            alg: jwk.alg.clone(),
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_type(&self) -> &str {
        &self.kty
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// The full set of signing keys published by the provider, keyed by `kid`.
///
/// A `KeySet` is built whole from one fetched document and replaced whole on
/// refresh; individual keys are never mutated in place.
#[derive(Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Converts a fetched JWKS document into usable verification keys.
    ///
    /// Keys tagged for non-signature use are skipped, as are key types this
    /// library does not verify with; a signature-use RSA key with missing or
    /// undecodable components fails the whole conversion.
    pub fn from_jwks(document: JwkSet) -> Result<Self, AuthError> {
        let mut keys = HashMap::new();
        for jwk in &document.keys {
            if !jwk.is_signature_key() {
                debug!(kid = %jwk.kid, usage = ?jwk.usage, "skipping non-signature key");
                continue;
            }
            if jwk.kty != "RSA" {
                debug!(kid = %jwk.kid, kty = %jwk.kty, "skipping unsupported key type");
                continue;
            }
            let key = SigningKey::from_jwk(jwk)?;
            keys.insert(key.kid.clone(), Arc::new(key));
        }
        Ok(Self { keys })
    }

    /// Builds a set from already-constructed keys. Intended for tests and
    /// fixed-key deployments.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = SigningKey>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.kid.clone(), Arc::new(key)))
                .collect(),
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

enum Source {
    /// Keys are fetched from the provider, located either by an explicit
    /// JWKS URI or through the issuer's discovery document.
    Remote {
        http: reqwest::Client,
        issuer_url: Url,
        jwks_uri: Option<Url>,
    },
    /// A fixed set injected at construction time. Nothing to fetch.
    Fixed(Arc<KeySet>),
}

/// Owns the cached key set and its refresh policy.
///
/// The cached set lives under a single cache entry so that an expiry or a
/// forced refresh republishes a complete replacement set: a concurrent
/// `resolve` sees either the old set or the new one, never a partial mix.
/// Concurrent fetches for the same entry coalesce into one in-flight
/// request; the other callers await its result.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct KeyStore {
    inner: Arc<Inner>,
}

struct Inner {
    source: Source,
    cache: Cache<(), Arc<KeySet>>,
    refresh_cooldown: Duration,
    /// When the last miss-triggered or explicit refresh was claimed.
    last_forced: Mutex<Option<Instant>>,
}

impl KeyStore {
    /// Creates a store that fetches keys from the provider described by the
    /// configuration.
    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });

        Self::build(
            Source::Remote {
                http,
                issuer_url: config.issuer_url.clone(),
                jwks_uri: config.jwks_uri.clone(),
            },
            config.cache_ttl,
            config.refresh_cooldown,
        )
    }

    /// Creates a store over a fixed key set, with no remote fetching.
    /// Lets tests validate tokens without network access.
    pub fn fixed(keys: KeySet) -> Self {
        Self::build(
            Source::Fixed(Arc::new(keys)),
            Duration::from_secs(300),
            Duration::ZERO,
        )
    }

    fn build(source: Source, cache_ttl: Duration, refresh_cooldown: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(cache_ttl)
            .build();
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                refresh_cooldown,
                last_forced: Mutex::new(None),
            }),
        }
    }

    /// Looks up a key by identifier in the current key set, fetching the set
    /// first if the cache is cold or expired. Never forces a refresh for a
    /// missing `kid`.
    pub async fn resolve(&self, kid: &str) -> Result<Option<Arc<SigningKey>>, AuthError> {
        Ok(self.current().await?.get(kid))
    }

    /// Fetches the key-set document and replaces the cached set wholesale.
    ///
    /// Also stamps the refresh cooldown, so a miss immediately after an
    /// explicit refresh is treated as final rather than refetching.
    #[instrument(skip(self), err)]
    pub async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        if let Source::Fixed(set) = &self.inner.source {
            return Ok(Arc::clone(set));
        }
        *self.inner.last_forced.lock().await = Some(Instant::now());
        self.reload().await
    }

    /// Resolve with the miss policy applied: an unknown `kid` triggers at
    /// most one cooldown-gated refresh before the miss becomes final.
    pub(crate) async fn resolve_or_refresh(
        &self,
        kid: &str,
    ) -> Result<Option<Arc<SigningKey>>, AuthError> {
        let set = self.current().await?;
        if let Some(key) = set.get(kid) {
            debug!(kid = %kid, "key-set cache hit");
            return Ok(Some(key));
        }
        if matches!(self.inner.source, Source::Fixed(_)) {
            return Ok(None);
        }
        if !self.try_claim_refresh_slot().await {
            debug!(kid = %kid, "unknown kid within refresh cooldown, not refetching");
            return Ok(None);
        }

        info!(kid = %kid, "unknown kid, forcing one key-set refresh");
        let set = self.reload().await?;
        Ok(set.get(kid))
    }

    /// Invalidate and refetch. Concurrent callers coalesce on the reload.
    async fn reload(&self) -> Result<Arc<KeySet>, AuthError> {
        self.inner.cache.invalidate(&()).await;
        self.current().await
    }

    /// The current key set, fetched on demand. Concurrent cold-cache calls
    /// share a single underlying fetch.
    async fn current(&self) -> Result<Arc<KeySet>, AuthError> {
        match &self.inner.source {
            Source::Fixed(set) => Ok(Arc::clone(set)),
            Source::Remote {
                http,
                issuer_url,
                jwks_uri,
            } => self
                .inner
                .cache
                .try_get_with((), fetch_key_set(http, issuer_url, jwks_uri.as_ref()))
                .await
                .map_err(|e: Arc<AuthError>| match e.as_ref() {
                    AuthError::InvalidKeyFormat(msg) => AuthError::InvalidKeyFormat(msg.clone()),
                    AuthError::KeyStoreUnavailable(msg) => {
                        AuthError::KeyStoreUnavailable(msg.clone())
                    }
                    other => AuthError::KeyStoreUnavailable(other.to_string()),
                }),
        }
    }

    /// Claims the right to force a refresh. Returns false while the cooldown
    /// from the previous forced refresh is still running.
    async fn try_claim_refresh_slot(&self) -> bool {
        let mut last = self.inner.last_forced.lock().await;
        match *last {
            Some(at) if at.elapsed() < self.inner.refresh_cooldown => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}

/// Fetches the JWKS document from the provider and converts it into a
/// [`KeySet`].
#[instrument(skip_all, err)]
async fn fetch_key_set(
    http: &reqwest::Client,
    issuer_url: &Url,
    jwks_uri: Option<&Url>,
) -> Result<Arc<KeySet>, AuthError> {
    let endpoint = match jwks_uri {
        Some(uri) => {
            debug!(uri = %uri, "using configured key-set endpoint");
            uri.clone()
        }
        None => discover_jwks_uri(http, issuer_url).await?,
    };

    let response = http.get(endpoint).send().await.map_err(|e| {
        error!(error = %e, "key-set fetch failed");
        AuthError::KeyStoreUnavailable(e.to_string())
    })?;
    if !response.status().is_success() {
        error!(status = %response.status(), "key-set endpoint returned an error");
        return Err(AuthError::KeyStoreUnavailable(format!(
            "key-set endpoint returned {}",
            response.status()
        )));
    }

    let document: JwkSet = response.json().await.map_err(|e| {
        error!(error = %e, "key-set document could not be parsed");
        AuthError::KeyStoreUnavailable(e.to_string())
    })?;

    let set = KeySet::from_jwks(document)?;
    info!(key_count = set.len(), "key set refreshed");
    Ok(Arc::new(set))
}

/// Locates the key-set endpoint through the issuer's discovery document.
async fn discover_jwks_uri(http: &reqwest::Client, issuer_url: &Url) -> Result<Url, AuthError> {
    // Issuer URLs are commonly published without a trailing slash; Url::join
    // would drop the last path segment of those.
    let base = issuer_url.as_str().trim_end_matches('/');
    let discovery_url = Url::parse(&format!("{base}/.well-known/openid-configuration"))
        .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;

    debug!(url = %discovery_url, "performing OIDC discovery");
    let response = http.get(discovery_url).send().await.map_err(|e| {
        error!(error = %e, "discovery fetch failed");
        AuthError::KeyStoreUnavailable(e.to_string())
    })?;
    if !response.status().is_success() {
        return Err(AuthError::KeyStoreUnavailable(format!(
            "discovery endpoint returned {}",
            response.status()
        )));
    }
    let document: DiscoveryDocument = response
        .json()
        .await
        .map_err(|e| AuthError::KeyStoreUnavailable(e.to_string()))?;

    let jwks_uri =
        Url::parse(&document.jwks_uri).map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
    debug!(uri = %jwks_uri, "discovered key-set endpoint");
    Ok(jwks_uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MODULUS: &str = "u1SU1LfVLPHCozMxH2Mo4lgOEePzNm0tRgeLezV6ffAt0gunVTLw7onLRnrq0_IzW7yWR7QkrmBL7jTKEn5u-qKhbwKfBstIs-bMY2Zkp18gnTxKLxoS2tFczGkPLPgizskuemMghRniWaoLcyehkd3qqGElvW_VDL5AaWTg0nLVkjRo9z-40RQzuVaE8AkAFmxZzow3x-VJYKdjykkJ0iT9wCS0DRTXu269V264Vf_3jvredZiKRkgwlL9xNAwxXFg0x_XFw005UWVRIkdgcKWTjpBP2dPwVZ4WWC-9aGVd-Gyn1o0CLelf4rEjGoXbAAEgAqeGUxrcIlbjXfbcmw";

    fn rsa_jwk(kid: &str) -> Jwk {
        serde_json::from_value(serde_json::json!({
            "kid": kid,
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "n": TEST_MODULUS,
            "e": "AQAB"
        }))
        .unwrap()
    }

    #[test]
    fn key_set_skips_encryption_keys() {
        let document: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                {"kid": "sig-1", "kty": "RSA", "use": "sig",
                 "n": TEST_MODULUS, "e": "AQAB"},
                {"kid": "enc-1", "kty": "RSA", "use": "enc",
                 "n": TEST_MODULUS, "e": "AQAB"}
            ]
        }))
        .unwrap();

        let set = KeySet::from_jwks(document).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("sig-1").is_some());
        assert!(set.get("enc-1").is_none());
    }

    #[test]
    fn key_set_skips_unsupported_key_types() {
        let document: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                {"kid": "ec-1", "kty": "EC", "use": "sig", "crv": "P-256"}
            ]
        }))
        .unwrap();

        let set = KeySet::from_jwks(document).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn rsa_key_without_modulus_fails_conversion() {
        let document: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{"kid": "broken", "kty": "RSA", "use": "sig", "e": "AQAB"}]
        }))
        .unwrap();

        let result = KeySet::from_jwks(document);
        assert!(matches!(result, Err(AuthError::InvalidKeyFormat(_))));
    }

    #[tokio::test]
    async fn fixed_store_resolves_without_network() {
        let key = SigningKey::from_jwk(&rsa_jwk("k1")).unwrap();
        let store = KeyStore::fixed(KeySet::from_keys([key]));

        assert!(store.resolve("k1").await.unwrap().is_some());
        assert!(store.resolve("k2").await.unwrap().is_none());
        // A miss on a fixed store is final, not a refresh trigger.
        assert!(store.resolve_or_refresh("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fixed_store_refresh_returns_the_same_set() {
        let key = SigningKey::from_jwk(&rsa_jwk("k1")).unwrap();
        let store = KeyStore::fixed(KeySet::from_keys([key]));

        let set = store.refresh().await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("k1").is_some());
    }

    #[test]
    fn signing_key_exposes_metadata() {
        let key = SigningKey::from_jwk(&rsa_jwk("k1")).unwrap();
        assert_eq!(key.kid(), "k1");
        assert_eq!(key.key_type(), "RSA");
        assert_eq!(key.algorithm(), Some("RS256"));
    }
}
