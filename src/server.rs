//! Service wiring and the HTTP serve loop.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::api;
use crate::auth::accounts::AccountService;
use crate::auth::authenticator::SessionAuthenticator;
use crate::auth::directory::UserDirectory;
use crate::auth::provider::{HttpIdentityProvider, IdentityProvider};
use crate::auth::provisioning::ProvisioningCoordinator;
use crate::auth::refresh::RefreshCoordinator;
use crate::config::{CookiePolicy, Environment, GatewayConfig};
use crate::db::{Db, create_connection, ensure_schema};

/// Shared context behind every request handler and middleware.
///
/// Cheap to clone: everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<SessionAuthenticator>,
    pub accounts: Arc<AccountService>,
    pub refresh: Arc<RefreshCoordinator>,
    pub directory: Arc<UserDirectory>,
    pub cookies: CookiePolicy,
    pub environment: Environment,
}

impl AppState {
    /// Wire the coordination layer over an already-connected store and an
    /// arbitrary provider implementation. Tests inject their provider double
    /// through this.
    pub fn assemble(
        db: Db,
        provider: Arc<dyn IdentityProvider>,
        config: &GatewayConfig,
    ) -> Self {
        let directory = Arc::new(UserDirectory::new(db.clone()));
        let refresh = Arc::new(RefreshCoordinator::new(Arc::clone(&provider)));
        let provisioning = Arc::new(ProvisioningCoordinator::new(db, config.provisioning));

        let authenticator = Arc::new(SessionAuthenticator::new(
            Arc::clone(&provider),
            Arc::clone(&refresh),
            Arc::clone(&directory),
        ));
        let accounts = Arc::new(AccountService::new(
            provider,
            Arc::clone(&directory),
            provisioning,
        ));

        Self {
            authenticator,
            accounts,
            refresh,
            directory,
            cookies: config.cookies,
            environment: config.environment,
        }
    }
}

/// Connect the store, build the HTTP provider client and assemble the state.
pub async fn bootstrap(config: &GatewayConfig) -> Result<AppState> {
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;

    let provider = Arc::new(HttpIdentityProvider::new(&config.provider)?);

    Ok(AppState::assemble(db, provider, config))
}

/// Run the gateway until the process is stopped.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let state = bootstrap(&config).await?;
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, environment = ?config.environment, "auth gateway listening");
    axum::serve(listener, router).await?;

    Ok(())
}
