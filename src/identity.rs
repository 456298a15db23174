// src/identity.rs

use crate::config::RoleSource;
use crate::error::AuthError;
use crate::validator::ClaimSet;
use serde::Serialize;
use std::collections::HashSet;

/// The normalized, request-scoped view of a verified claim set.
///
/// Built once per request from a [`ClaimSet`] and never mutated afterwards.
/// Because a `ClaimSet` only exists for tokens that passed signature and
/// temporal verification, holding an `Identity` implies the bearer was
/// authenticated.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    /// The stable subject identifier. Always present.
    pub subject: String,
    /// The provider's preferred username, if the token carried one.
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Deduplicated application role names. Possibly empty: a token may
    /// legitimately carry no roles.
    pub roles: HashSet<String>,
}

impl Identity {
    /// Derives an identity from a verified claim set.
    ///
    /// The subject claim is the provider's side of the contract; its absence
    /// is an error rather than grounds for a substitute value. An absent
    /// role container yields an empty role set.
    pub fn from_claims(claims: &ClaimSet, source: &RoleSource) -> Result<Self, AuthError> {
        let subject = claims
            .sub
            .clone()
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(Self {
            subject,
            username: claims.preferred_username.clone(),
            email: claims.email.clone(),
            display_name: claims.name.clone(),
            roles: roles_from(claims, source),
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Reads role names out of the configured container. Absence at any step of
/// the path means no roles, not an error.
fn roles_from(claims: &ClaimSet, source: &RoleSource) -> HashSet<String> {
    match source {
        RoleSource::RealmRoles => claims
            .realm_access
            .as_ref()
            .map(|container| container.roles.iter().cloned().collect())
            .unwrap_or_default(),
        RoleSource::ClientRoles(client_id) => claims
            .resource_access
            .as_ref()
            .and_then(|containers| containers.get(client_id))
            .map(|container| container.roles.iter().cloned().collect())
            .unwrap_or_default(),
        RoleSource::ClaimPath(path) => roles_at_path(&claims.other, path),
    }
}

/// Walks a claim path through the unmodeled claims down to a list of role
/// names. Non-list leaves and missing segments yield the empty set.
fn roles_at_path(
    claims: &serde_json::Map<String, serde_json::Value>,
    path: &[String],
) -> HashSet<String> {
    let Some((first, rest)) = path.split_first() else {
        return HashSet::new();
    };
    let mut value = match claims.get(first) {
        Some(value) => value,
        None => return HashSet::new(),
    };
    for segment in rest {
        value = match value.get(segment) {
            Some(next) => next,
            None => return HashSet::new(),
        };
    }
    match value.as_array() {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| entry.as_str())
            .map(str::to_owned)
            .collect(),
        None => HashSet::new(),
    }
}
