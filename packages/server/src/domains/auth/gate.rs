//! Authorization gate: opaque bearer credential in, member identity out.
//!
//! Nothing past the gate parses credentials. Handlers and the session relay
//! only ever see a resolved [`MemberId`].

use std::sync::Arc;

use tracing::debug;

use crate::common::MemberId;
use crate::domains::exchanges::ExchangeError;

/// External identity verifier.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> anyhow::Result<MemberId>;
}

#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: Arc<dyn IdentityVerifier>,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { verifier }
    }

    /// Resolve a credential, accepting both `Bearer <token>` and a raw token.
    pub fn resolve(&self, credential: Option<&str>) -> Result<MemberId, ExchangeError> {
        let credential = credential.map(str::trim).filter(|c| !c.is_empty());
        let Some(credential) = credential else {
            return Err(ExchangeError::Unauthenticated);
        };

        let token = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();
        if token.is_empty() {
            return Err(ExchangeError::Unauthenticated);
        }

        self.verifier.verify(token).map_err(|e| {
            debug!(error = %e, "Credential rejected");
            ExchangeError::Unauthenticated
        })
    }
}
