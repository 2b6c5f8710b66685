//! Authentication and session coordination.
//!
//! This module is the trust boundary in front of every protected request:
//!
//! - **Token resolution**: the bearer credential may arrive in the
//!   `Authorization` header, the `access_token` cookie or a query
//!   parameter, with an explicit precedence between them.
//! - **Verification**: credentials are opaque here; the external identity
//!   provider verifies them (`get_user`).
//! - **Silent refresh**: an expired session is re-minted from the httpOnly
//!   `refresh_token` cookie, with concurrent attempts for the same
//!   credential coalesced into a single provider call.
//! - **Role annotation**: the stored application role is fetched with
//!   service-level credentials, normalized into a closed enum, and defaults
//!   to least privilege on any failure.
//! - **Provisioning**: new accounts get their default entitlements with a
//!   bounded retry against replication lag.
//!
//! ## Security model
//!
//! - Refresh credentials are accepted from the httpOnly cookie only, never
//!   from headers or query parameters.
//! - Unauthenticated responses are uniform; callers learn nothing about
//!   which carrier or provider call failed.
//! - Raw tokens never reach the logs; fingerprints do.
//! - A secondary-system outage (role store, entitlement store) never blocks
//!   authentication or signup.

pub mod accounts;
pub mod authenticator;
pub mod directory;
pub mod middleware;
pub mod provider;
pub mod provisioning;
pub mod refresh;
pub mod roles;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::AccountService;
pub use authenticator::{AuthError, AuthUser, Authenticated, SessionAuthenticator};
pub use directory::UserDirectory;
pub use middleware::ADMIN_ROLES;
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderError, ProviderUser, Session};
pub use provisioning::ProvisioningCoordinator;
pub use refresh::RefreshCoordinator;
pub use roles::Role;
pub use token::{RequestCredentials, resolve};
