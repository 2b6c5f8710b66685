//! Account lifecycle operations: signup, sign-in, sign-out.
//!
//! Thin orchestration over the identity provider, the directory and the
//! provisioning coordinator. The provider owns the account; this service
//! adds the platform-side bookkeeping around it.

use std::sync::Arc;
use tracing::warn;

use crate::auth::authenticator::AuthUser;
use crate::auth::directory::UserDirectory;
use crate::auth::provider::{IdentityProvider, ProviderError, ProviderUser, Session};
use crate::auth::provisioning::ProvisioningCoordinator;
use crate::types::AccessToken;

pub struct AccountService {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<UserDirectory>,
    provisioning: Arc<ProvisioningCoordinator>,
}

impl AccountService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<UserDirectory>,
        provisioning: Arc<ProvisioningCoordinator>,
    ) -> Self {
        Self {
            provider,
            directory,
            provisioning,
        }
    }

    /// Register a new account and bootstrap its default entitlements.
    ///
    /// Provisioning is best-effort: signup succeeds once the provider has
    /// accepted the account, whatever happens to the bookkeeping writes.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, ProviderError> {
        let user = self.provider.sign_up(email, password).await?;
        self.provisioning.provision_defaults(&user.id).await;
        Ok(self.hydrate(user).await)
    }

    /// Exchange email + password for a session.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(AuthUser, Session), ProviderError> {
        let (user, session) = self.provider.sign_in_with_password(email, password).await?;

        if let Err(e) = self.directory.record_login(&user.id).await {
            warn!(user_id = %user.id, error = %e, "failed to record last_login");
        }

        Ok((self.hydrate(user).await, session))
    }

    /// Revoke the session behind an access credential.
    pub async fn sign_out(&self, token: &AccessToken) -> Result<(), ProviderError> {
        self.provider.sign_out(token).await
    }

    /// Verify an access credential and return the fully annotated user.
    pub async fn current_user(&self, token: &AccessToken) -> Result<AuthUser, ProviderError> {
        let user = self.provider.get_user(token).await?;
        Ok(self.hydrate(user).await)
    }

    /// Annotate a provider identity with role and subscription, degrading
    /// to defaults on any store failure.
    async fn hydrate(&self, user: ProviderUser) -> AuthUser {
        let role = self.directory.resolve_role(&user.id).await;

        let subscription = match self.directory.subscription_for(&user.id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "subscription lookup failed");
                None
            }
        };

        let last_login = match self.directory.profile(&user.id).await {
            Ok(record) => record.and_then(|r| r.last_login),
            Err(_) => None,
        };

        AuthUser {
            id: user.id,
            email: user.email.unwrap_or_default(),
            role,
            subscription,
            last_login,
        }
    }
}
