//! Role and profile reads/writes against the user store.
//!
//! All queries run over the service-level connection: row-level access
//! policies can hide a user's own role row from a normal read, and the
//! gateway must see it regardless.

use anyhow::Result;
use tracing::warn;

use crate::auth::roles::Role;
use crate::db::{Db, SubscriptionRecord, UserRecord, user_record_id};
use crate::types::UserId;

/// Store object for the `user` and `subscription` tables.
pub struct UserDirectory {
    db: Db,
}

impl UserDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Fetch a user's profile row, if visible.
    pub async fn profile(&self, user: &UserId) -> Result<Option<UserRecord>> {
        let query = "SELECT * FROM user WHERE id = $id LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("id", user_record_id(user)))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Resolve a user's application role.
    ///
    /// Total: every failure path degrades to the least-privilege default
    /// with a warning. The raw stored value is parsed exactly once, here at
    /// the database boundary; anything that is not a string role field is
    /// treated as missing.
    pub async fn resolve_role(&self, user: &UserId) -> Role {
        match self.profile(user).await {
            Ok(Some(record)) => {
                if record.role.is_none() {
                    warn!(user_id = %user, "user row has no stored role; defaulting to user");
                }
                Role::normalize(record.role.as_deref())
            }
            Ok(None) => {
                warn!(user_id = %user, "user row not found; defaulting to user role");
                Role::User
            }
            Err(e) => {
                warn!(user_id = %user, error = %e, "role fetch failed; defaulting to user role");
                Role::User
            }
        }
    }

    /// True when the user's profile row is visible to reads.
    ///
    /// Freshly signed-up users may not be visible yet (replication lag);
    /// provisioning retries on this.
    pub async fn user_visible(&self, user: &UserId) -> Result<bool> {
        Ok(self.profile(user).await?.is_some())
    }

    /// Record a successful sign-in on the profile row.
    pub async fn record_login(&self, user: &UserId) -> Result<()> {
        let query = r#"
            UPDATE user SET
                last_login = time::now(),
                updated_at = time::now()
            WHERE id = $id
        "#;

        self.db
            .query(query)
            .bind(("id", user_record_id(user)))
            .await?;

        Ok(())
    }

    /// Overwrite a user's stored role with its canonical spelling.
    pub async fn set_role(&self, user: &UserId, role: Role) -> Result<()> {
        let query = r#"
            UPDATE user SET
                role = $role,
                updated_at = time::now()
            WHERE id = $id
        "#;

        self.db
            .query(query)
            .bind(("id", user_record_id(user)))
            .bind(("role", role.as_str()))
            .await?;

        Ok(())
    }

    /// Create (or overwrite) a user profile row.
    ///
    /// Normally the identity platform's replication writes these rows; this
    /// exists for the admin surface and for backfills.
    pub async fn create_profile(
        &self,
        user: &UserId,
        email: Option<&str>,
        role: Option<&str>,
    ) -> Result<UserRecord> {
        let email = email.map(|s| s.to_string());
        let role = role.map(|s| s.to_string());

        let query = r#"
            UPSERT $id CONTENT {
                email: $email,
                role: $role
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("id", user_record_id(user)))
            .bind(("email", email))
            .bind(("role", role))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("failed to create user profile"))
    }

    /// Fetch the user's entitlement record, if any.
    pub async fn subscription_for(&self, user: &UserId) -> Result<Option<SubscriptionRecord>> {
        let query = "SELECT * FROM subscription WHERE user_id = $user_id LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_record_id(user)))
            .await?;

        let subscriptions: Vec<SubscriptionRecord> = res.take(0)?;
        Ok(subscriptions.into_iter().next())
    }
}
