use std::sync::Arc;

use fleetdesk_auth::AccessContext;

/// Per-request access context, resolved once by the auth middleware and
/// threaded to handlers via request extensions.
///
/// This is an explicit request-scoped value, never a process-wide singleton:
/// concurrent requests each carry their own.
#[derive(Debug, Clone)]
pub struct RequestAccess(Arc<AccessContext>);

impl RequestAccess {
    pub fn new(ctx: AccessContext) -> Self {
        Self(Arc::new(ctx))
    }

    pub fn context(&self) -> &AccessContext {
        &self.0
    }
}
