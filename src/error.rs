// src/error.rs

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// The primary error type for the `realm-guard` library.
///
/// Every token-validation failure carries the stage at which it occurred so
/// that internal observability can distinguish, for example, a rotated key
/// from a forged signature. Callers that surface errors to HTTP clients
/// should use [`AuthError::external_message`] instead of the `Display`
/// output: the display strings are for logs only.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is not a structurally valid compact JWT (wrong number of
    /// segments, empty segments, invalid base64url, oversized, or an
    /// undecodable header/payload).
    #[error("token is structurally malformed")]
    Malformed,

    /// The algorithm declared in the token header is not in the accepted set.
    #[error("token algorithm {0:?} is not in the accepted set")]
    AlgorithmRejected(Algorithm),

    /// No signing key with the token's `kid` exists, even after a refresh.
    #[error("no signing key found for kid '{0}'")]
    UnknownKey(String),

    /// The signature does not verify against the resolved public key.
    #[error("token signature verification failed")]
    BadSignature,

    /// The `exp` claim is in the past, beyond the configured leeway.
    #[error("token has expired")]
    Expired,

    /// The `nbf` claim is in the future, beyond the configured leeway.
    #[error("token is not yet valid")]
    NotYetValid,

    /// The `aud` claim does not match the expected audience, or is absent
    /// while an audience is expected.
    #[error("token audience is not acceptable")]
    AudienceRejected,

    /// The `iss` claim does not match the configured issuer, or is absent
    /// while issuer verification is on.
    #[error("token issuer is not acceptable")]
    IssuerRejected,

    /// The verified claim set carries no `sub` claim. This is a contract
    /// violation by the identity provider; no default subject is substituted.
    #[error("verified token carries no subject claim")]
    MissingSubject,

    /// The key-set document could not be fetched (network failure, timeout,
    /// non-success status, or an unparseable response). Validation that
    /// depends on a refresh fails closed with this error.
    #[error("signing key set is unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// Authorization denial: the identity holds none of the required roles.
    /// Distinct from every authentication failure so callers can map it to a
    /// different external status.
    #[error("access denied: requires one of roles {required:?}")]
    Forbidden {
        /// The role set the denied operation required.
        required: Vec<String>,
    },

    /// A required configuration field is missing.
    #[error("a required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid (for example, an empty required-role
    /// set).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A fetched signing key is malformed or uses unsupported parameters.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}

impl AuthError {
    /// The generic message safe to return to an unauthenticated caller.
    ///
    /// Authentication failures all collapse to the same string so that the
    /// failing stage (bad signature vs. unknown key vs. expiry) is never
    /// leaked; the typed variant remains available for logging.
    pub fn external_message(&self) -> &'static str {
        match self {
            AuthError::Forbidden { .. } => "insufficient permissions",
            AuthError::KeyStoreUnavailable(_) => "authentication service unavailable",
            AuthError::MissingConfiguration(_)
            | AuthError::InvalidConfiguration(_)
            | AuthError::InvalidUrl(_)
            | AuthError::InvalidKeyFormat(_) => "internal configuration error",
            _ => "the access token is invalid or expired",
        }
    }

    /// Whether the failure is transient and worth retrying later, as opposed
    /// to a permanent rejection of this token.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::KeyStoreUnavailable(_))
    }

    /// Whether this is an authorization denial rather than an authentication
    /// failure. The two must map to different external statuses.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AuthError::Forbidden { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authn_failures_share_one_external_message() {
        let errors = [
            AuthError::Malformed,
            AuthError::BadSignature,
            AuthError::Expired,
            AuthError::UnknownKey("k1".into()),
            AuthError::MissingSubject,
        ];
        for err in &errors {
            assert_eq!(err.external_message(), "the access token is invalid or expired");
        }
    }

    #[test]
    fn forbidden_is_distinguishable_from_authn_failure() {
        let denied = AuthError::Forbidden { required: vec!["admin".into()] };
        assert!(denied.is_forbidden());
        assert!(!AuthError::BadSignature.is_forbidden());
        assert_ne!(denied.external_message(), AuthError::BadSignature.external_message());
    }

    #[test]
    fn only_key_store_outage_is_transient() {
        assert!(AuthError::KeyStoreUnavailable("timeout".into()).is_transient());
        assert!(!AuthError::BadSignature.is_transient());
        assert!(!AuthError::UnknownKey("k1".into()).is_transient());
    }
}
