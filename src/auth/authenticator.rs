//! Session authentication: verify the bearer credential, or silently mint a
//! new session from the refresh credential when none is present.

use std::sync::Arc;
use surrealdb::sql::Datetime;
use tracing::{debug, warn};

use crate::auth::directory::UserDirectory;
use crate::auth::provider::{IdentityProvider, ProviderError, ProviderUser, Session};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::roles::Role;
use crate::auth::token::RequestCredentials;
use crate::db::SubscriptionRecord;
use crate::types::{UserId, fingerprint};

/// Identity attached to a request after successful authentication.
///
/// Constructed fresh per resolution, never mutated in place. `role` has
/// already been normalized; the raw stored value never leaves the
/// directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub subscription: Option<SubscriptionRecord>,
    pub last_login: Option<Datetime>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Role check against possibly-legacy role labels; both sides are
    /// normalized before comparison.
    pub fn has_role(&self, required: &[&str]) -> bool {
        self.role.matches_any_label(required)
    }
}

/// Authentication failures.
///
/// Every variant maps to the same uniform "unauthenticated" response at the
/// HTTP surface; the distinction exists for logs and tests only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No usable credential in any carrier. A normal state, not a fault.
    #[error("no credential presented")]
    NoCredential,
    /// The provider rejected the access credential.
    #[error("invalid or expired token")]
    InvalidToken,
    /// A refresh was attempted and the provider rejected it.
    #[error("session refresh failed: {0}")]
    RefreshFailed(ProviderError),
}

/// Successful authentication, plus the session minted on the way if the
/// refresh path ran. The transport layer uses `issued` to set a fresh
/// readable access-token cookie on the response.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: AuthUser,
    pub issued: Option<Session>,
}

/// Verifies credentials against the identity provider and annotates the
/// result with the stored application role.
pub struct SessionAuthenticator {
    provider: Arc<dyn IdentityProvider>,
    refresh: Arc<RefreshCoordinator>,
    directory: Arc<UserDirectory>,
}

impl SessionAuthenticator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        refresh: Arc<RefreshCoordinator>,
        directory: Arc<UserDirectory>,
    ) -> Self {
        Self {
            provider,
            refresh,
            directory,
        }
    }

    /// Authenticate a request's resolved credentials.
    ///
    /// With no access credential, falls back to a (single-flighted) silent
    /// refresh from the httpOnly refresh cookie; refresh credentials are
    /// never accepted from headers or query parameters. A present credential
    /// is verified with the provider's `get_user`, and the role comes from
    /// the directory with its least-privilege default.
    pub async fn authenticate(
        &self,
        credentials: &RequestCredentials,
    ) -> Result<Authenticated, AuthError> {
        let (token, issued) = match credentials.access.clone() {
            Some(token) => {
                debug!(carrier = ?credentials.carrier, "access credential resolved");
                (token, None)
            }
            None => {
                let refresh = credentials.refresh.as_ref().ok_or(AuthError::NoCredential)?;
                debug!(
                    refresh = %fingerprint(refresh.as_str()),
                    "no access credential; attempting silent refresh"
                );
                let session = self
                    .refresh
                    .refresh(refresh)
                    .await
                    .map_err(AuthError::RefreshFailed)?;
                (session.access_token.clone(), Some(session))
            }
        };

        let user = self.provider.get_user(&token).await.map_err(|e| {
            debug!(
                token = %fingerprint(token.as_str()),
                error = %e,
                "provider rejected access credential"
            );
            AuthError::InvalidToken
        })?;

        Ok(Authenticated {
            user: self.annotate(user).await,
            issued,
        })
    }

    /// Authenticate if possible; `None` instead of an error otherwise.
    ///
    /// For call sites that render for both anonymous and signed-in callers.
    pub async fn optional_authenticate(
        &self,
        credentials: &RequestCredentials,
    ) -> Option<Authenticated> {
        match self.authenticate(credentials).await {
            Ok(authenticated) => Some(authenticated),
            Err(AuthError::NoCredential) => None,
            Err(e) => {
                debug!(error = %e, "optional authentication failed; continuing anonymous");
                None
            }
        }
    }

    /// Attach role and profile data to a provider-verified identity.
    ///
    /// Directory failures never propagate: the identity stands with the
    /// default role and no profile annotations.
    async fn annotate(&self, user: ProviderUser) -> AuthUser {
        let (role, last_login) = match self.directory.profile(&user.id).await {
            Ok(Some(record)) => {
                if record.role.is_none() {
                    warn!(user_id = %user.id, "user row has no stored role; defaulting to user");
                }
                (Role::normalize(record.role.as_deref()), record.last_login)
            }
            Ok(None) => {
                warn!(user_id = %user.id, "user row not found; defaulting to user role");
                (Role::User, None)
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "role fetch failed; defaulting to user role");
                (Role::User, None)
            }
        };

        AuthUser {
            id: user.id,
            email: user.email.unwrap_or_default(),
            role,
            subscription: None,
            last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{MockProvider, setup_test_db, test_session};
    use crate::auth::token;
    use crate::types::AccessToken;
    use axum::http::HeaderMap;
    use std::sync::atomic::Ordering;

    fn credentials(access: Option<&str>, refresh: Option<&str>) -> RequestCredentials {
        RequestCredentials {
            access: access.map(AccessToken::new),
            carrier: access.map(|_| token::Carrier::BearerHeader),
            refresh: refresh.map(crate::types::RefreshToken::new),
        }
    }

    async fn authenticator(provider: Arc<MockProvider>) -> (SessionAuthenticator, Arc<UserDirectory>) {
        let db = setup_test_db().await;
        let directory = Arc::new(UserDirectory::new(db));
        let refresh = Arc::new(RefreshCoordinator::new(provider.clone()));
        (
            SessionAuthenticator::new(provider, refresh, directory.clone()),
            directory,
        )
    }

    #[tokio::test]
    async fn test_valid_token_with_stored_admin_role() {
        let provider = Arc::new(MockProvider::new().with_user("valid-token", "u-1", "a@example.com"));
        let (authenticator, directory) = authenticator(provider).await;
        directory
            .create_profile(&UserId::new("u-1"), Some("a@example.com"), Some("Admin"))
            .await
            .unwrap();

        let result = authenticator
            .authenticate(&credentials(Some("valid-token"), None))
            .await
            .unwrap();

        assert_eq!(result.user.id.as_str(), "u-1");
        assert_eq!(result.user.email, "a@example.com");
        assert_eq!(result.user.role, Role::Admin);
        assert!(result.issued.is_none());
    }

    #[tokio::test]
    async fn test_invalid_token_is_uniform_failure() {
        let provider = Arc::new(MockProvider::new());
        let (authenticator, _) = authenticator(provider).await;

        let err = authenticator
            .authenticate(&credentials(Some("garbage"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_no_credentials_at_all() {
        let provider = Arc::new(MockProvider::new());
        let (authenticator, _) = authenticator(provider).await;

        let err = authenticator
            .authenticate(&credentials(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoCredential));
    }

    #[tokio::test]
    async fn test_refresh_path_mints_and_verifies_session() {
        let session = test_session("minted", "rotated", "u-2");
        let provider = Arc::new(
            MockProvider::new()
                .with_refresh("ref-0", session.clone())
                .with_user("minted", "u-2", "b@example.com"),
        );
        let (authenticator, _) = authenticator(provider.clone()).await;

        let result = authenticator
            .authenticate(&credentials(None, Some("ref-0")))
            .await
            .unwrap();

        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
        // The minted credential still goes through the provider's verify.
        assert_eq!(provider.get_user_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.user.id.as_str(), "u-2");
        // The minted session must surface so the transport can set cookies.
        assert_eq!(result.issued, Some(session));
        // Role store had no row: least-privilege default.
        assert_eq!(result.user.role, Role::User);
    }

    #[tokio::test]
    async fn test_refresh_failure_collapses_to_unauthenticated() {
        let provider = Arc::new(MockProvider::new());
        let (authenticator, _) = authenticator(provider).await;

        let err = authenticator
            .authenticate(&credentials(None, Some("revoked")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_optional_authenticate_never_fails() {
        let provider = Arc::new(MockProvider::new().with_user("tok", "u-3", "c@example.com"));
        let (authenticator, _) = authenticator(provider).await;

        assert!(
            authenticator
                .optional_authenticate(&credentials(None, None))
                .await
                .is_none()
        );
        assert!(
            authenticator
                .optional_authenticate(&credentials(Some("wrong"), None))
                .await
                .is_none()
        );
        let authenticated = authenticator
            .optional_authenticate(&credentials(Some("tok"), None))
            .await
            .unwrap();
        assert_eq!(authenticated.user.id.as_str(), "u-3");
    }

    #[tokio::test]
    async fn test_resolved_identity_excludes_error_and_vice_versa() {
        // The result type makes identity and error mutually exclusive; this
        // pins the invariant for the two interesting paths.
        let provider = Arc::new(MockProvider::new().with_user("tok", "u-4", "d@example.com"));
        let (authenticator, _) = authenticator(provider).await;

        let ok = authenticator.authenticate(&credentials(Some("tok"), None)).await;
        assert!(ok.is_ok());
        let err = authenticator.authenticate(&credentials(None, None)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_credentials_resolution_feeds_authenticator() {
        // Full path from raw headers: header precedence applies before
        // verification.
        let provider = Arc::new(MockProvider::new().with_user("header-tok", "u-5", "e@example.com"));
        let (authenticator, _) = authenticator(provider).await;

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer header-tok".parse().unwrap(),
        );
        headers.insert(
            axum::http::header::COOKIE,
            "access_token=cookie-tok".parse().unwrap(),
        );

        let creds = token::resolve(&headers, None);
        let result = authenticator.authenticate(&creds).await.unwrap();
        assert_eq!(result.user.id.as_str(), "u-5");
    }
}
