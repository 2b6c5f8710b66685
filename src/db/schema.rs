use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::types::UserId;

/// Record ID for a user profile row, keyed by the provider's user ID.
pub fn user_record_id(user: &UserId) -> RecordId {
    RecordId::from_table_key("user", user.as_str())
}

/// Persisted user profile row.
///
/// Written by the identity platform's replication into this store; the
/// gateway reads `role`/`last_login` and writes `role`, `last_login` and
/// `updated_at`. `role` is the raw stored value and must never reach
/// callers without normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable database identifier (table: `user`, key: provider user ID).
    pub id: RecordId,
    /// Email as known to the platform, if replicated.
    pub email: Option<String>,
    /// Raw stored role value; may be missing or a legacy spelling.
    pub role: Option<String>,
    /// Last successful password sign-in.
    pub last_login: Option<Datetime>,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
    /// When this record was last updated.
    pub updated_at: Option<Datetime>,
}

/// Persisted entitlement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Stable database identifier (table: `subscription`).
    pub id: RecordId,
    /// Owning user.
    pub user_id: RecordId,
    /// Plan identifier, e.g. "free".
    pub plan_type: String,
    /// Lifecycle status, e.g. "trial" or "active".
    pub status: String,
    /// Device limit granted by the plan.
    pub max_devices: u32,
    /// When the subscription started.
    pub started_at: Option<Datetime>,
    /// Whether the subscription renews automatically.
    pub auto_renew: bool,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
}

/// Payload for creating an entitlement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionCreate {
    pub user_id: RecordId,
    pub plan_type: String,
    pub status: String,
    pub max_devices: u32,
    pub auto_renew: bool,
}

impl SubscriptionCreate {
    /// The default entitlement a fresh account gets at signup: free plan,
    /// trial status, a single device, no auto-renew.
    pub fn default_for(user: &UserId) -> Self {
        Self {
            user_id: user_record_id(user),
            plan_type: "free".to_string(),
            status: "trial".to_string(),
            max_devices: 1,
            auto_renew: false,
        }
    }
}
