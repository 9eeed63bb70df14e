use serde::{Deserialize, Serialize};

use fleetdesk_core::UserId;

use crate::Role;

/// An authenticated principal.
///
/// Immutable for the request lifetime. The role is the authoritative value
/// loaded from storage at resolution time, never a token claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role,
        }
    }
}
