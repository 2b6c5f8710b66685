//! Default entitlement bootstrap for new accounts.
//!
//! Runs right after the identity provider accepts a signup. The user's
//! profile row is replicated into this store asynchronously, so reads
//! immediately after signup can miss it; attempts are retried on a bounded,
//! fixed-delay policy. Exhausting the retries is warned and swallowed: a
//! user's ability to authenticate must never depend on this bookkeeping
//! write, and signup reports success regardless.

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::db::{Db, SubscriptionCreate, SubscriptionRecord, user_record_id};
use crate::types::UserId;

pub struct ProvisioningCoordinator {
    db: Db,
    policy: RetryPolicy,
}

impl ProvisioningCoordinator {
    pub fn new(db: Db, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    /// Create the default entitlement record for a new user.
    ///
    /// Never fails: every attempt emits an event, and exhaustion downgrades
    /// to a warning. Idempotent: an existing entitlement short-circuits.
    pub async fn provision_defaults(&self, user: &UserId) {
        for attempt in 1..=self.policy.max_attempts {
            match self.try_provision(user).await {
                Ok(()) => {
                    debug!(user_id = %user, attempt, "default entitlement provisioned");
                    return;
                }
                Err(e) => {
                    info!(
                        user_id = %user,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "entitlement provisioning attempt failed"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay()).await;
                    }
                }
            }
        }

        warn!(
            user_id = %user,
            attempts = self.policy.max_attempts,
            "giving up on default entitlement provisioning; signup proceeds without it"
        );
    }

    async fn try_provision(&self, user: &UserId) -> Result<()> {
        // The profile row is written by the identity platform's replication;
        // until it shows up, entitlement creation would dangle. Treat
        // invisibility as the retryable condition.
        let mut res = self
            .db
            .query("SELECT id FROM user WHERE id = $id LIMIT 1")
            .bind(("id", user_record_id(user)))
            .await?;
        let visible: Vec<serde_json::Value> = res.take(0)?;
        if visible.is_empty() {
            bail!("user row not yet visible");
        }

        if self.existing_subscription(user).await?.is_some() {
            return Ok(());
        }

        let create = SubscriptionCreate::default_for(user);
        let query = r#"
            CREATE subscription CONTENT {
                user_id: $user_id,
                plan_type: $plan_type,
                status: $status,
                max_devices: $max_devices,
                started_at: time::now(),
                auto_renew: $auto_renew
            }
        "#;

        self.db
            .query(query)
            .bind(("user_id", create.user_id))
            .bind(("plan_type", create.plan_type))
            .bind(("status", create.status))
            .bind(("max_devices", create.max_devices))
            .bind(("auto_renew", create.auto_renew))
            .await?;

        Ok(())
    }

    async fn existing_subscription(&self, user: &UserId) -> Result<Option<SubscriptionRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM subscription WHERE user_id = $user_id LIMIT 1")
            .bind(("user_id", user_record_id(user)))
            .await?;
        let subscriptions: Vec<SubscriptionRecord> = res.take(0)?;
        Ok(subscriptions.into_iter().next())
    }
}
