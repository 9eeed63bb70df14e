use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use fleetdesk_audit::{AuditAction, AuditEntity, NewAuditRecord};
use fleetdesk_auth::{check, Role};
use fleetdesk_core::CompanyId;

use crate::app::{errors, services::AppServices};
use crate::context::RequestAccess;

/// Audit access is limited to the platform admin and company owners.
const AUDIT_ROLES: &[Role] = &[Role::Admin, Role::Owner];

const DEFAULT_LIMIT: u32 = 100;

pub fn router() -> Router {
    Router::new().route("/audit", get(list_audit).delete(clear_audit))
}

#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub company_id: Option<CompanyId>,
    pub limit: Option<u32>,
}

/// The scope an audit call operates on: a global admin may pass any company
/// (or none for the unscoped view); everyone else is pinned to their own.
fn audit_scope(
    ctx: &fleetdesk_auth::AccessContext,
    explicit: Option<CompanyId>,
) -> Result<Option<CompanyId>, axum::response::Response> {
    match ctx.scope.company_id {
        Some(own) => {
            if explicit.is_some_and(|c| c != own) {
                return Err(errors::json_error(
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "access denied",
                ));
            }
            Ok(Some(own))
        }
        None => Ok(explicit),
    }
}

pub async fn list_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, AUDIT_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let scope = match audit_scope(ctx, query.company_id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Some(company) = scope {
        if let Err(e) = check(ctx, AUDIT_ROLES, Some(company)) {
            return errors::gate_error_to_response(e);
        }
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(1000);
    match services.audit_log.list_audit(scope, limit).await {
        Ok(records) => {
            (StatusCode::OK, Json(serde_json::json!({ "records": records }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Clear the audit trail in scope. Privileged, and itself audited: the trail
/// records who cleared what, even though the cleared rows are gone.
pub async fn clear_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<AuditQuery>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, AUDIT_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let scope = match audit_scope(ctx, query.company_id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Some(company) = scope {
        if let Err(e) = check(ctx, AUDIT_ROLES, Some(company)) {
            return errors::gate_error_to_response(e);
        }
    }

    let removed = match services.audit_log.clear_audit(scope).await {
        Ok(n) => n,
        Err(e) => return errors::store_error_to_response(e),
    };

    services
        .recorder
        .record(NewAuditRecord {
            actor_id: ctx.principal.id,
            role: ctx.scope.role,
            company_id: scope,
            entity: AuditEntity::AuditLog,
            entity_id: *ctx.principal.id.as_uuid(),
            action: AuditAction::Delete,
            before_state: Some(serde_json::json!({ "records": removed })),
            after_state: None,
        })
        .await;

    (
        StatusCode::OK,
        Json(serde_json::json!({ "cleared": removed })),
    )
        .into_response()
}
