// src/validator.rs

use crate::config::{AudiencePolicy, Config, VerificationPolicy};
use crate::error::AuthError;
use crate::store::KeyStore;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};
use url::Url;

/// Upper bound on the raw token length, applied before any parsing.
/// Provider-issued access tokens are far smaller; anything beyond this is
/// garbage or an attempted resource-exhaustion payload.
const MAX_TOKEN_LEN: usize = 8192;

/// A role container nested inside a claim, e.g. `realm_access.roles`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleContainer {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The `aud` claim: providers emit either a single string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// The claims of a token that passed signature and temporal verification.
///
/// Required and optional fields are explicit: an absent optional claim is
/// `None`, never an empty string. Claims outside the modeled set are kept in
/// `other` so configured claim paths can reach provider-specific containers.
///
/// A `ClaimSet` is only ever produced by [`TokenValidator::verify`]; there
/// is no constructor from unverified input.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSet {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<Audience>,
    pub exp: Option<u64>,
    pub nbf: Option<u64>,
    pub iat: Option<u64>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Realm-level role container.
    pub realm_access: Option<RoleContainer>,
    /// Client-level role containers, keyed by client id.
    pub resource_access: Option<HashMap<String, RoleContainer>>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Verifies raw bearer tokens against the key store and the configured
/// policy. This is the single trust boundary: nothing downstream of a
/// successful [`verify`](TokenValidator::verify) re-checks the token.
///
/// Created once and reused across requests; cheap to clone.
#[derive(Clone)]
pub struct TokenValidator {
    issuer_url: Url,
    policy: VerificationPolicy,
    key_store: KeyStore,
}

impl TokenValidator {
    pub fn new(config: &Config, key_store: KeyStore) -> Self {
        Self {
            issuer_url: config.issuer_url.clone(),
            policy: config.verification.clone(),
            key_store,
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Runs the full verification pipeline over a raw compact token.
    ///
    /// The stages run in order and short-circuit on the first failure:
    /// structure, header, algorithm gate, key resolution (with at most one
    /// key-set refresh), signature, payload decode, temporal checks, and the
    /// policy-gated audience/issuer checks.
    #[instrument(skip(self, token), err)]
    pub async fn verify(&self, token: &str) -> Result<ClaimSet, AuthError> {
        // 1. Structural check before anything touches the contents.
        check_structure(token)?;

        // 2. Decode the header for the declared algorithm and kid; nothing
        //    else in it is trusted.
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        if !self.policy.algorithms.contains(&header.alg) {
            return Err(AuthError::AlgorithmRejected(header.alg));
        }
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::Malformed)?;

        // 3. Resolve the signing key; an unknown kid gets one cooldown-gated
        //    refresh before the miss is final.
        let key = self
            .key_store
            .resolve_or_refresh(&kid)
            .await?
            .ok_or_else(|| AuthError::UnknownKey(kid.clone()))?;

        // 4.-7. Signature, payload, temporal and policy checks.
        let validation = self.build_validation(header.alg);
        let data = decode::<serde_json::Value>(token, key.decoding_key(), &validation)
            .map_err(map_jwt_error)?;

        let claims: ClaimSet =
            serde_json::from_value(data.claims).map_err(|_| AuthError::Malformed)?;

        debug!(kid = %kid, sub = ?claims.sub, "token verified");
        Ok(claims)
    }

    fn build_validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.policy.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;

        // Temporal claims are checked when present but not demanded; the
        // required set below only grows with the configured policy.
        let mut required: Vec<&str> = Vec::new();

        match &self.policy.audience {
            AudiencePolicy::Ignore => {
                validation.validate_aud = false;
            }
            AudiencePolicy::Expect(audiences) => {
                validation.set_audience(audiences);
                required.push("aud");
            }
        }
        if self.policy.verify_issuer {
            validation.set_issuer(&[self.issuer_url.as_str()]);
            required.push("iss");
        }
        validation.set_required_spec_claims(&required);
        validation
    }
}

/// Size cap plus the compact-serialization shape: exactly three non-empty
/// dot-separated segments, each valid base64url.
fn check_structure(token: &str) -> Result<(), AuthError> {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(AuthError::Malformed);
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::Malformed);
    }
    for segment in segments {
        if segment.is_empty() || base64_url::decode(segment).is_err() {
            return Err(AuthError::Malformed);
        }
    }
    Ok(())
}

/// Maps the JWT library's error kinds onto the typed taxonomy, so callers
/// always learn which stage failed.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidSignature => AuthError::BadSignature,
        ErrorKind::InvalidAudience => AuthError::AudienceRejected,
        ErrorKind::InvalidIssuer => AuthError::IssuerRejected,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "aud" => AuthError::AudienceRejected,
            "iss" => AuthError::IssuerRejected,
            _ => AuthError::Malformed,
        },
        ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat | ErrorKind::Crypto(_) => {
            AuthError::BadSignature
        }
        _ => AuthError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::model::Jwk;
    use crate::store::{KeySet, SigningKey};

    const TEST_MODULUS: &str = "u1SU1LfVLPHCozMxH2Mo4lgOEePzNm0tRgeLezV6ffAt0gunVTLw7onLRnrq0_IzW7yWR7QkrmBL7jTKEn5u-qKhbwKfBstIs-bMY2Zkp18gnTxKLxoS2tFczGkPLPgizskuemMghRniWaoLcyehkd3qqGElvW_VDL5AaWTg0nLVkjRo9z-40RQzuVaE8AkAFmxZzow3x-VJYKdjykkJ0iT9wCS0DRTXu269V264Vf_3jvredZiKRkgwlL9xNAwxXFg0x_XFw005UWVRIkdgcKWTjpBP2dPwVZ4WWC-9aGVd-Gyn1o0CLelf4rEjGoXbAAEgAqeGUxrcIlbjXfbcmw";

    fn validator_with_kid(kid: &str) -> TokenValidator {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kid": kid, "kty": "RSA", "use": "sig", "n": TEST_MODULUS, "e": "AQAB"
        }))
        .unwrap();
        let store = KeyStore::fixed(KeySet::from_keys([SigningKey::from_jwk(&jwk).unwrap()]));
        let config = ConfigBuilder::new()
            .issuer_url("https://id.test.local/")
            .unwrap()
            .build()
            .unwrap();
        TokenValidator::new(&config, store)
    }

    fn forge(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.{}",
            base64_url::encode(header),
            base64_url::encode(payload),
            base64_url::encode("not-a-real-signature")
        )
    }

    #[tokio::test]
    async fn rejects_wrong_segment_counts() {
        let validator = validator_with_kid("k1");
        for token in ["only.two", "a.b.c.d", "single", ""] {
            let result = validator.verify(token).await;
            assert!(matches!(result, Err(AuthError::Malformed)), "token {token:?}");
        }
    }

    #[tokio::test]
    async fn rejects_empty_segments() {
        let validator = validator_with_kid("k1");
        let result = validator.verify(".payload.signature").await;
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn rejects_invalid_base64_segments() {
        let validator = validator_with_kid("k1");
        let result = validator.verify("!!!bad!!!.payload.signature").await;
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn rejects_oversized_tokens_before_parsing() {
        let validator = validator_with_kid("k1");
        let huge = format!("{}.b.c", "a".repeat(MAX_TOKEN_LEN));
        let result = validator.verify(&huge).await;
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn rejects_algorithm_outside_the_accepted_set() {
        let validator = validator_with_kid("k1");
        let token = forge(
            r#"{"alg":"HS256","typ":"JWT","kid":"k1"}"#,
            r#"{"sub":"u1"}"#,
        );
        let result = validator.verify(&token).await;
        assert!(matches!(result, Err(AuthError::AlgorithmRejected(Algorithm::HS256))));
    }

    #[tokio::test]
    async fn rejects_header_without_kid() {
        let validator = validator_with_kid("k1");
        let token = forge(r#"{"alg":"RS256","typ":"JWT"}"#, r#"{"sub":"u1"}"#);
        let result = validator.verify(&token).await;
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn rejects_empty_kid() {
        let validator = validator_with_kid("k1");
        let token = forge(r#"{"alg":"RS256","typ":"JWT","kid":""}"#, r#"{"sub":"u1"}"#);
        let result = validator.verify(&token).await;
        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[tokio::test]
    async fn unknown_kid_is_reported_as_such() {
        let validator = validator_with_kid("k1");
        let token = forge(
            r#"{"alg":"RS256","typ":"JWT","kid":"rotated-away"}"#,
            r#"{"sub":"u1"}"#,
        );
        let result = validator.verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnknownKey(kid)) if kid == "rotated-away"));
    }

    #[tokio::test]
    async fn forged_signature_fails_before_any_claim_is_read() {
        let validator = validator_with_kid("k1");
        // Payload claims look perfectly valid; only the signature is wrong.
        let token = forge(
            r#"{"alg":"RS256","typ":"JWT","kid":"k1"}"#,
            r#"{"sub":"u1","exp":9999999999}"#,
        );
        let result = validator.verify(&token).await;
        assert!(matches!(result, Err(AuthError::BadSignature)));
    }

    #[test]
    fn claim_set_keeps_unmodeled_claims_reachable() {
        let claims: ClaimSet = serde_json::from_value(serde_json::json!({
            "sub": "u1",
            "realm_access": {"roles": ["user"]},
            "groups": ["ops", "dev"]
        }))
        .unwrap();

        assert_eq!(claims.sub.as_deref(), Some("u1"));
        assert_eq!(claims.realm_access.unwrap().roles, vec!["user"]);
        assert!(claims.other.contains_key("groups"));
        assert!(claims.preferred_username.is_none());
    }

    #[test]
    fn audience_claim_accepts_both_wire_shapes() {
        let one: Audience = serde_json::from_value(serde_json::json!("account")).unwrap();
        let many: Audience =
            serde_json::from_value(serde_json::json!(["account", "gateway"])).unwrap();

        assert!(one.contains("account"));
        assert!(!one.contains("gateway"));
        assert!(many.contains("gateway"));
        assert!(!many.contains("other"));
    }
}
