use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use fleetdesk_auth::Role;
use fleetdesk_core::{CompanyId, UserId};

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    View,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::View => "view",
        }
    }
}

/// The kind of entity an audit record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    Vehicle,
    Booking,
    Contract,
    Payment,
    Company,
    User,
    /// The audit log itself; clearing it is an audited, privileged action.
    AuditLog,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Vehicle => "vehicle",
            AuditEntity::Booking => "booking",
            AuditEntity::Contract => "contract",
            AuditEntity::Payment => "payment",
            AuditEntity::Company => "company",
            AuditEntity::User => "user",
            AuditEntity::AuditLog => "audit_log",
        }
    }
}

/// An audit record before it is assigned an id and timestamp by the store.
///
/// `role` is the actor's *real* role: an impersonating admin is recorded as
/// `admin`, never as the owner of the company it entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub actor_id: UserId,
    pub role: Role,
    /// `None` for global admin actions.
    pub company_id: Option<CompanyId>,
    pub entity: AuditEntity,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub before_state: Option<JsonValue>,
    pub after_state: Option<JsonValue>,
}

/// A persisted, immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: UserId,
    pub role: Role,
    pub company_id: Option<CompanyId>,
    pub entity: AuditEntity,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub before_state: Option<JsonValue>,
    pub after_state: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}
