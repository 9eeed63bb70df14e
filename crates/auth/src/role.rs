use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted role of a user.
///
/// The role set is closed on purpose: the permission gate is the single place
/// that pattern-matches on it, and endpoints never re-implement role
/// comparisons against raw strings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator; global scope unless impersonating a company.
    Admin,
    /// Company owner; bound to exactly one company.
    Owner,
    /// Company manager; bound to exactly one company.
    Manager,
    /// End customer; bound to their own records.
    Client,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Client => "client",
        }
    }

    /// Roles whose scope is bound to a company row.
    pub fn is_company_bound(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "manager" => Ok(Role::Manager),
            "client" => Ok(Role::Client),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
