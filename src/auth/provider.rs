//! Identity provider contract and its HTTP implementation.
//!
//! The provider owns credentials and user identities; this layer only
//! carries them. Everything the gateway needs from the provider is behind
//! [`IdentityProvider`] so the coordinator and authenticator can be
//! exercised against an in-memory double in tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::types::{AccessToken, RefreshToken, UserId, fingerprint};

/// User identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub id: UserId,
    pub email: Option<String>,
}

/// A credential pair minted by the provider on sign-in or refresh.
///
/// Not persisted by this layer; the cookie mechanism owned by the transport
/// is the only persistence a session gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    /// Provider-reported access-credential lifetime, when available.
    pub expires_in: Option<u64>,
    pub user_id: UserId,
}

/// Errors from provider operations.
///
/// `Clone` is load-bearing: a refresh failure is fanned out to every caller
/// coalesced onto the same in-flight operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered and said no (bad credential, bad password,
    /// revoked refresh token, rate limit, ...).
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The provider could not be reached or the connection failed mid-way.
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    /// The provider answered with a payload this client cannot interpret.
    #[error("unexpected response from identity provider: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Rate-limit rejections get a distinct status at the HTTP surface.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::Rejected { status: 429, .. })
    }
}

/// Operations the gateway needs from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser, ProviderError>;

    /// Exchange email + password for a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(ProviderUser, Session), ProviderError>;

    /// Revoke the session behind an access credential.
    async fn sign_out(&self, token: &AccessToken) -> Result<(), ProviderError>;

    /// Verify an access credential and return the user it belongs to.
    async fn get_user(&self, token: &AccessToken) -> Result<ProviderUser, ProviderError>;

    /// Exchange a refresh credential for a fresh session.
    async fn refresh_session(&self, token: &RefreshToken) -> Result<Session, ProviderError>;
}

// Wire payloads. The provider speaks a GoTrue-style REST API; these are the
// only shapes this client will accept.

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    expires_in: Option<u64>,
    user: UserPayload,
}

/// Signup returns the bare user when email confirmation is pending, and a
/// full session when autoconfirm is on. Both carry the user we need.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpPayload {
    Session(SessionPayload),
    User(UserPayload),
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl From<UserPayload> for ProviderUser {
    fn from(user: UserPayload) -> Self {
        ProviderUser {
            id: UserId::new(user.id),
            email: user.email,
        }
    }
}

impl SessionPayload {
    fn into_parts(self) -> (ProviderUser, Session) {
        let user = ProviderUser::from(self.user);
        let session = Session {
            access_token: AccessToken::new(self.access_token),
            refresh_token: RefreshToken::new(self.refresh_token),
            expires_in: self.expires_in,
            user_id: user.id.clone(),
        };
        (user, session)
    }
}

/// HTTP client for a GoTrue-style identity provider.
pub struct HttpIdentityProvider {
    base_url: Url,
    service_key: String,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// Build a client from the provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            service_key: config.service_key.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
        }

        let message = match response.json::<ErrorPayload>().await {
            Ok(body) => body
                .error_description
                .or(body.msg)
                .or(body.message)
                .or(body.error)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };

        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn transport(e: reqwest::Error) -> ProviderError {
        ProviderError::Transport(e.to_string())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("signup")?)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport)?;

        let payload: SignUpPayload = Self::decode(response).await?;
        let user = match payload {
            SignUpPayload::Session(session) => session.into_parts().0,
            SignUpPayload::User(user) => user.into(),
        };
        debug!(user_id = %user.id, "provider signup accepted");
        Ok(user)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(ProviderUser, Session), ProviderError> {
        let mut endpoint = self.endpoint("token")?;
        endpoint.set_query(Some("grant_type=password"));

        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport)?;

        let payload: SessionPayload = Self::decode(response).await?;
        Ok(payload.into_parts())
    }

    async fn sign_out(&self, token: &AccessToken) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.endpoint("logout")?)
            .header("apikey", &self.service_key)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: status.to_string(),
            })
        }
    }

    async fn get_user(&self, token: &AccessToken) -> Result<ProviderUser, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("user")?)
            .header("apikey", &self.service_key)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        let payload: UserPayload = Self::decode(response).await?;
        Ok(payload.into())
    }

    async fn refresh_session(&self, token: &RefreshToken) -> Result<Session, ProviderError> {
        let mut endpoint = self.endpoint("token")?;
        endpoint.set_query(Some("grant_type=refresh_token"));

        debug!(
            refresh = %fingerprint(token.as_str()),
            "exchanging refresh credential at provider"
        );

        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "refresh_token": token.as_str() }))
            .send()
            .await
            .map_err(Self::transport)?;

        let payload: SessionPayload = Self::decode(response).await?;
        Ok(payload.into_parts().1)
    }
}
