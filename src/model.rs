// src/model.rs

use serde::Deserialize;

/// The subset of an OIDC provider's discovery document this library reads.
/// Found at the issuer's `.well-known/openid-configuration` endpoint.
#[derive(Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

/// A single JSON Web Key (JWK) as published by the identity provider.
///
/// Only the fields needed to build an RSA verification key are modeled;
/// everything except `kid` and `kty` is optional because providers publish
/// keys for other purposes (encryption, other algorithms) in the same set.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    #[serde(default, rename = "use")]
    pub usage: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus, base64url.
    #[serde(default)]
    pub n: Option<String>,
    /// RSA public exponent, base64url.
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Whether this key is usable for signature verification. Keys tagged
    /// for another use (e.g. `enc`) are skipped rather than rejected.
    pub fn is_signature_key(&self) -> bool {
        match self.usage.as_deref() {
            Some("sig") | None => true,
            Some(_) => false,
        }
    }
}

/// A JSON Web Key Set document: the provider's published signing keys.
#[derive(Debug, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_keycloak_shaped_jwks() {
        let json = r#"{
            "keys": [
                {"kid": "rsa-sig", "kty": "RSA", "use": "sig", "alg": "RS256", "n": "abc", "e": "AQAB"},
                {"kid": "rsa-enc", "kty": "RSA", "use": "enc", "alg": "RSA-OAEP", "n": "def", "e": "AQAB"}
            ]
        }"#;

        let set: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.keys.len(), 2);
        assert!(set.keys[0].is_signature_key());
        assert!(!set.keys[1].is_signature_key());
    }

    #[test]
    fn untagged_usage_counts_as_signature_key() {
        let json = r#"{"kid": "k1", "kty": "RSA", "n": "abc", "e": "AQAB"}"#;
        let jwk: Jwk = serde_json::from_str(json).unwrap();
        assert!(jwk.is_signature_key());
        assert!(jwk.alg.is_none());
    }

    #[test]
    fn discovery_document_reads_jwks_uri() {
        let json = r#"{
            "issuer": "https://id.example.com/realms/apps",
            "jwks_uri": "https://id.example.com/realms/apps/protocol/openid-connect/certs",
            "token_endpoint": "https://id.example.com/realms/apps/protocol/openid-connect/token"
        }"#;

        let doc: DiscoveryDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.issuer, "https://id.example.com/realms/apps");
        assert!(doc.jwks_uri.ends_with("/certs"));
    }
}
