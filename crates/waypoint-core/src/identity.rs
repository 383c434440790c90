//! The `IdentityVerifier` trait -- the contract to the external identity
//! collaborator.

use async_trait::async_trait;

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier; the quota ledger keys counters by this.
    pub user_id: String,
    /// Optional email hint, used only for the VIP allow-list comparison
    /// (hashed, never stored).
    pub email_hint: Option<String>,
}

/// Resolve a bearer token into an identity.
///
/// `None` means unauthenticated; the orchestrator treats that as a terminal
/// auth error.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Option<Identity>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn IdentityVerifier) {}
};
