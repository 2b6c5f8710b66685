//! Gateway configuration.
//!
//! Assembled from CLI flags and environment variables in the binary; the
//! library takes the finished struct so tests can build one directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::db::DatabaseConfig;

/// Deployment environment. Cookie security attributes depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Identity provider endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider's auth API, e.g.
    /// `https://id.example.com/auth/v1/`. Joined with relative endpoint
    /// paths, so it must end with a trailing slash.
    pub base_url: Url,
    /// Service-level API key sent with every provider call.
    pub service_key: String,
    /// Request timeout for provider calls.
    pub timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn new(base_url: Url, service_key: impl Into<String>) -> Self {
        Self {
            base_url: ensure_trailing_slash(base_url),
            service_key: service_key.into(),
            timeout_seconds: default_provider_timeout(),
        }
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn default_provider_timeout() -> u64 {
    10
}

/// Cookie attributes applied to the session cookies this layer writes.
///
/// Production sits behind HTTPS on a separate origin from the dashboards,
/// so cookies need `Secure` + `SameSite=None`; development has no HTTPS and
/// falls back to `SameSite=Lax` so browsers will store them at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Lax,
    None,
    Strict,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
            SameSite::Strict => "Strict",
        }
    }
}

impl CookiePolicy {
    pub fn for_environment(environment: Environment) -> Self {
        if environment.is_production() {
            Self {
                secure: true,
                same_site: SameSite::None,
            }
        } else {
            Self {
                secure: false,
                same_site: SameSite::Lax,
            }
        }
    }
}

/// Bounded retry settings for post-signup provisioning.
///
/// A first-class value rather than an ad hoc loop so tests and operators can
/// see and change the bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Top-level configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener, e.g. `0.0.0.0:8080`.
    pub bind: String,
    pub environment: Environment,
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    pub provisioning: RetryPolicy,
    pub cookies: CookiePolicy,
}

impl GatewayConfig {
    /// Build a config with cookie policy derived from the environment.
    pub fn new(
        bind: impl Into<String>,
        environment: Environment,
        provider: ProviderConfig,
        database: DatabaseConfig,
    ) -> Self {
        Self {
            bind: bind.into(),
            environment,
            provider,
            database,
            provisioning: RetryPolicy::default(),
            cookies: CookiePolicy::for_environment(environment),
        }
    }
}
