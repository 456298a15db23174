// src/lib.rs

//! Bearer-token verification and role-based authorization for services
//! behind an OIDC identity provider.
//!
//! The crate is a verifier and policy gate, not an issuer: it turns an
//! opaque JWT string into a trusted [`identity::Identity`] and decides
//! whether that identity may invoke a guarded operation. Signing keys are
//! fetched from the provider's published key set and cached with a bounded
//! refresh policy, so key rotation needs no process restart.
//!
//! ```no_run
//! use realm_guard::prelude::*;
//!
//! # async fn handle(authorization_header: &str) -> Result<(), AuthError> {
//! let config = ConfigBuilder::new()
//!     .issuer_url("https://id.example.com/realms/apps")?
//!     .build()?;
//! let authenticator = Authenticator::new(config);
//! let admin_only = RoleGuard::new(["admin"])?;
//!
//! let identity = authenticator.authenticate(authorization_header).await?;
//! let identity = admin_only.check(identity)?;
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod authz;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod store;
pub mod validator;

pub use authenticator::Authenticator;
pub use error::AuthError;

/// The public prelude for the `realm-guard` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::authenticator::Authenticator;
    pub use crate::authz::{
        authorize, AuthorizationDecision, DecisionReason, RequiredRoles, RoleGuard,
    };
    pub use crate::config::{AudiencePolicy, Config, ConfigBuilder, RoleSource};
    pub use crate::error::AuthError;
    pub use crate::identity::Identity;
    pub use crate::store::{KeySet, KeyStore, SigningKey};
    pub use crate::validator::{ClaimSet, TokenValidator};
    pub use jsonwebtoken::Algorithm;
}
