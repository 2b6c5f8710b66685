//! Application roles and the access policy over them.
//!
//! Stored role values are historically inconsistent ("Super Admin",
//! "admin_user", "ADMIN"), so every raw value passes through
//! [`Role::normalize`] before any comparison. The enum is closed: whatever
//! the backend holds, a resolved role is always one of these three members.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed application role set.
///
/// Viewer/read-only spellings collapse to [`Role::User`]; there is no
/// distinct member for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Normalize an arbitrary stored role value into the closed enum.
    ///
    /// Lower-cases the input, strips whitespace/hyphen/underscore
    /// separators, then matches by substring so that legacy spellings like
    /// "Super Admin", "super-admin" and "ADMIN_USER" all land on the right
    /// member. Total: absent or garbage input maps to [`Role::User`].
    pub fn normalize(raw: Option<&str>) -> Role {
        let Some(raw) = raw else {
            return Role::User;
        };

        let folded: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        if folded.contains("superadmin") {
            Role::SuperAdmin
        } else if folded.contains("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Canonical stored spelling for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// True for roles that carry administrative privileges.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// True if this role is one of `allowed`.
    pub fn satisfies_any(&self, allowed: &[Role]) -> bool {
        allowed.contains(self)
    }

    /// True if this role matches any of the requested role labels.
    ///
    /// Each requested label goes through the same normalization as stored
    /// values, so the comparison is symmetric regardless of which side is
    /// using a legacy spelling.
    pub fn matches_any_label(&self, required: &[&str]) -> bool {
        required
            .iter()
            .any(|label| Role::normalize(Some(label)) == *self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
