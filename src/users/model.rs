use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Closed set of roles; authorization checks match against fixed
/// allow-lists of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Standard,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Role::Standard),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

/// Identity record. The password hash lives in [`UserCredentials`] and is
/// only fetched through the explicit `*_with_password` store lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_changed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// A token issued before the most recent password change is stale.
    /// Comparison happens at second resolution against the token's `iat`.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => token_iat < changed_at.unix_timestamp(),
            None => false,
        }
    }
}

/// A user record together with its stored password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Input for creating a new account. The role is always `standard`; elevated
/// roles are granted by an admin afterwards, never taken from a signup body.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Admin-side partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AdminUserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}
