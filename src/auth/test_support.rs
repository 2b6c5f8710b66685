//! Shared test doubles: an in-memory identity provider with call counters,
//! and database setup helpers.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::provider::{IdentityProvider, ProviderError, ProviderUser, Session};
use crate::db::{Db, DatabaseConfig, create_connection, ensure_schema};
use crate::types::{AccessToken, RefreshToken, UserId};

pub(crate) async fn setup_test_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

pub(crate) fn test_session(access: &str, refresh: &str, user_id: &str) -> Session {
    Session {
        access_token: AccessToken::new(access),
        refresh_token: RefreshToken::new(refresh),
        expires_in: Some(3600),
        user_id: UserId::new(user_id),
    }
}

#[derive(Default)]
struct MockState {
    /// email -> (password, user id) accepted by sign_in / reserved for sign_up.
    accounts: HashMap<String, (String, UserId)>,
    /// Emails that have completed sign_up.
    signed_up: HashSet<String>,
    /// access token -> identity returned by get_user.
    users: HashMap<String, ProviderUser>,
    /// refresh token -> exact session returned on refresh.
    refresh_sessions: HashMap<String, Session>,
    /// refresh token -> identity, for sessions minted on the fly.
    refresh_users: HashMap<String, ProviderUser>,
    /// Revoked access tokens.
    revoked: HashSet<String>,
}

/// In-memory [`IdentityProvider`] double.
///
/// Counts upstream calls so tests can assert on coalescing, and can delay
/// refreshes so concurrent callers genuinely overlap.
pub(crate) struct MockProvider {
    state: Mutex<MockState>,
    refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub get_user_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            refresh_delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
            get_user_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
        }
    }

    /// Register an access token that `get_user` will accept.
    pub fn with_user(self, token: &str, user_id: &str, email: &str) -> Self {
        self.state.lock().unwrap().users.insert(
            token.to_string(),
            ProviderUser {
                id: UserId::new(user_id),
                email: Some(email.to_string()),
            },
        );
        self
    }

    /// Register a refresh token and the exact session it exchanges into.
    pub fn with_refresh(self, token: &str, session: Session) -> Self {
        self.add_refresh(token, session);
        self
    }

    /// Register credentials the provider will accept for sign_in/sign_up.
    pub fn with_account(self, email: &str, password: &str, user_id: &str) -> Self {
        self.state.lock().unwrap().accounts.insert(
            email.to_string(),
            (password.to_string(), UserId::new(user_id)),
        );
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Register a refresh token after construction.
    pub fn add_refresh(&self, token: &str, session: Session) {
        self.state
            .lock()
            .unwrap()
            .refresh_sessions
            .insert(token.to_string(), session);
    }

    fn mint_session(state: &mut MockState, user: ProviderUser) -> Session {
        let session = Session {
            access_token: AccessToken::new(format!("acc-{}", Uuid::new_v4())),
            refresh_token: RefreshToken::new(format!("ref-{}", Uuid::new_v4())),
            expires_in: Some(3600),
            user_id: user.id.clone(),
        };
        state
            .users
            .insert(session.access_token.as_str().to_string(), user.clone());
        state
            .refresh_users
            .insert(session.refresh_token.as_str().to_string(), user);
        session
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser, ProviderError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        if state.signed_up.contains(email) {
            return Err(ProviderError::Rejected {
                status: 422,
                message: "User already registered".to_string(),
            });
        }
        state.signed_up.insert(email.to_string());

        let id = match state.accounts.get(email) {
            Some((_, id)) => id.clone(),
            None => {
                let id = UserId::new(Uuid::new_v4().to_string());
                state
                    .accounts
                    .insert(email.to_string(), (password.to_string(), id.clone()));
                id
            }
        };

        Ok(ProviderUser {
            id,
            email: Some(email.to_string()),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(ProviderUser, Session), ProviderError> {
        let mut state = self.state.lock().unwrap();

        let Some((expected, id)) = state.accounts.get(email).cloned() else {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        };
        if expected != password {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        }

        let user = ProviderUser {
            id,
            email: Some(email.to_string()),
        };
        let session = Self::mint_session(&mut state, user.clone());
        Ok((user, session))
    }

    async fn sign_out(&self, token: &AccessToken) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.users.remove(token.as_str());
        state.revoked.insert(token.as_str().to_string());
        Ok(())
    }

    async fn get_user(&self, token: &AccessToken) -> Result<ProviderUser, ProviderError> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();

        if state.revoked.contains(token.as_str()) {
            return Err(ProviderError::Rejected {
                status: 401,
                message: "token revoked".to_string(),
            });
        }
        state
            .users
            .get(token.as_str())
            .cloned()
            .ok_or(ProviderError::Rejected {
                status: 401,
                message: "invalid JWT".to_string(),
            })
    }

    async fn refresh_session(&self, token: &RefreshToken) -> Result<Session, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        // Let concurrent callers pile up before settling.
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let mut state = self.state.lock().unwrap();

        if let Some(session) = state.refresh_sessions.get(token.as_str()).cloned() {
            return Ok(session);
        }
        if let Some(user) = state.refresh_users.get(token.as_str()).cloned() {
            return Ok(Self::mint_session(&mut state, user));
        }

        Err(ProviderError::Rejected {
            status: 400,
            message: "Invalid Refresh Token".to_string(),
        })
    }
}
