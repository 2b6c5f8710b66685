//! Silent session refresh with single-flight coalescing.
//!
//! Under load, many requests can observe an expired access credential within
//! the same short window. Without coalescing, each would independently hit
//! the provider's refresh endpoint with the same refresh credential, which
//! wastes upstream calls and can trip provider-side rate limits while the
//! responses race to rotate cookies. The coordinator guarantees exactly one
//! upstream refresh call per logical refresh event: all concurrent callers
//! for the same credential await one shared operation and observe its one
//! result.

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::auth::provider::{IdentityProvider, ProviderError, Session};
use crate::types::{RefreshToken, fingerprint};

type SharedRefresh = Shared<BoxFuture<'static, Result<Session, ProviderError>>>;

/// Coalesces concurrent refresh attempts per refresh-credential value.
///
/// The in-flight map is owned here and never exposed; `refresh` is the only
/// entry point. The lock guards only map bookkeeping, never provider I/O,
/// so distinct credentials cannot block each other.
pub struct RefreshCoordinator {
    provider: Arc<dyn IdentityProvider>,
    in_flight: Mutex<HashMap<String, SharedRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Exchange a refresh credential for a fresh session, joining any
    /// refresh already in flight for the same credential.
    ///
    /// The first caller to find no entry performs the actual provider call;
    /// everyone else awaits the same shared handle and receives the same
    /// settled result, success or failure. The entry is removed only after
    /// settlement, and only while it still holds the settled generation, so
    /// a refresh started later for the same credential is never evicted by
    /// a late waiter.
    ///
    /// Failures are not retried here; a failed refresh means "no session
    /// available" and retry policy belongs to the caller.
    pub async fn refresh(&self, token: &RefreshToken) -> Result<Session, ProviderError> {
        let handle = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(token.as_str()) {
                Some(existing) => {
                    debug!(
                        refresh = %fingerprint(token.as_str()),
                        "joining in-flight refresh"
                    );
                    existing.clone()
                }
                None => {
                    let provider = Arc::clone(&self.provider);
                    let owned = token.clone();
                    let handle: SharedRefresh =
                        async move { provider.refresh_session(&owned).await }
                            .boxed()
                            .shared();
                    in_flight.insert(token.as_str().to_string(), handle.clone());
                    debug!(
                        refresh = %fingerprint(token.as_str()),
                        "starting refresh"
                    );
                    handle
                }
            }
        };

        let result = handle.clone().await;

        // Settled: clear the entry so a new refresh attempt can start. Guard
        // with ptr_eq because another caller may already have cleaned up and
        // a newer generation may occupy the slot.
        let mut in_flight = self.in_flight.lock().await;
        if let Some(current) = in_flight.get(token.as_str())
            && current.ptr_eq(&handle)
        {
            in_flight.remove(token.as_str());
        }

        if let Err(e) = &result {
            debug!(
                refresh = %fingerprint(token.as_str()),
                error = %e,
                "refresh settled with failure"
            );
        }
        result
    }

    /// Number of refresh operations currently in flight (diagnostics only).
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::MockProvider;
    use crate::types::AccessToken;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn session(suffix: &str) -> Session {
        Session {
            access_token: AccessToken::new(format!("acc-{suffix}")),
            refresh_token: RefreshToken::new(format!("ref-{suffix}")),
            expires_in: Some(3600),
            user_id: crate::types::UserId::new("u-1"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_coalesce_to_one_call() {
        let provider = Arc::new(
            MockProvider::new()
                .with_refresh("ref-0", session("0"))
                .with_refresh_delay(Duration::from_millis(50)),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(provider.clone()));

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let coordinator = Arc::clone(&coordinator);
            tasks.push(tokio::spawn(async move {
                coordinator.refresh(&RefreshToken::new("ref-0")).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), session("0"));
        }
        // No stale entries accumulate once everything has settled.
        assert_eq!(coordinator.in_flight_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_tokens_do_not_block_each_other() {
        let provider = Arc::new(
            MockProvider::new()
                .with_refresh("ref-a", session("a"))
                .with_refresh("ref-b", session("b"))
                .with_refresh_delay(Duration::from_millis(50)),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(provider.clone()));

        let a = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh(&RefreshToken::new("ref-a")).await })
        };
        let b = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh(&RefreshToken::new("ref-b")).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), session("a"));
        assert_eq!(b.await.unwrap().unwrap(), session("b"));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_propagates_to_every_waiter() {
        let provider = Arc::new(
            MockProvider::new().with_refresh_delay(Duration::from_millis(30)),
        );
        // No session registered for this token: refresh is rejected.
        let coordinator = Arc::new(RefreshCoordinator::new(provider.clone()));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let coordinator = Arc::clone(&coordinator);
            tasks.push(tokio::spawn(async move {
                coordinator.refresh(&RefreshToken::new("revoked")).await
            }));
        }

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, ProviderError::Rejected { status: 400, .. }));
        }
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_new_refresh_possible_after_settlement() {
        let provider = Arc::new(MockProvider::new().with_refresh("ref-0", session("0")));
        let coordinator = RefreshCoordinator::new(provider.clone());
        let token = RefreshToken::new("ref-0");

        coordinator.refresh(&token).await.unwrap();
        coordinator.refresh(&token).await.unwrap();

        // Sequential calls each get their own upstream refresh: the entry is
        // cleared as soon as the previous operation settled.
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_poison_the_key() {
        let provider = Arc::new(MockProvider::new());
        let coordinator = RefreshCoordinator::new(provider.clone());
        let token = RefreshToken::new("ref-0");

        assert!(coordinator.refresh(&token).await.is_err());

        // The credential becomes valid afterwards (e.g. a concurrent login
        // re-issued it); the coordinator must attempt a fresh exchange.
        provider.add_refresh("ref-0", session("0"));
        assert_eq!(coordinator.refresh(&token).await.unwrap(), session("0"));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 2);
    }
}
