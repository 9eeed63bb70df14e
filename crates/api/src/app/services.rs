//! Infrastructure wiring: stores, access resolver, audit recorder, workflows.

use std::sync::Arc;

use chrono::{Duration, Utc};

use fleetdesk_audit::AuditRecorder;
use fleetdesk_auth::{Role, Session, SessionToken};
use fleetdesk_core::{CompanyId, UserId};
use fleetdesk_infra::{
    AccessResolver, AuditLogStore, CompanyRecord, DirectoryStore, InMemoryStore, PostgresStore,
    RentalStore, RentalWorkflows, StoreAuditSink, UserRecord,
};

/// Shared service handles for the HTTP layer.
///
/// Built once at startup; request handlers receive it via an extension. All
/// per-request state is resolved explicitly in the middleware, so this struct
/// holds only store/engine handles.
#[derive(Clone)]
pub struct AppServices {
    pub resolver: Arc<AccessResolver>,
    pub directory: Arc<dyn DirectoryStore>,
    pub rentals: Arc<dyn RentalStore>,
    pub audit_log: Arc<dyn AuditLogStore>,
    pub recorder: AuditRecorder,
    pub workflows: RentalWorkflows,
}

impl AppServices {
    fn wire(
        directory: Arc<dyn DirectoryStore>,
        rentals: Arc<dyn RentalStore>,
        audit_log: Arc<dyn AuditLogStore>,
    ) -> Self {
        let resolver = Arc::new(AccessResolver::new(directory.clone()));
        let recorder = AuditRecorder::new(Arc::new(StoreAuditSink::new(audit_log.clone())));
        let workflows = RentalWorkflows::new(rentals.clone(), recorder.clone());

        Self {
            resolver,
            directory,
            rentals,
            audit_log,
            recorder,
            workflows,
        }
    }

    /// In-memory wiring for tests and dev. Returns the concrete store too so
    /// the caller can seed it.
    pub fn in_memory() -> (Arc<Self>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let services = Self::wire(store.clone(), store.clone(), store.clone());
        (Arc::new(services), store)
    }

    /// Postgres wiring for deployments.
    pub fn postgres(pool: sqlx::PgPool) -> Arc<Self> {
        let store = Arc::new(PostgresStore::new(pool));
        Arc::new(Self::wire(store.clone(), store.clone(), store))
    }
}

/// Seed a small dev dataset so the in-memory server is usable out of the box.
///
/// Logs the dev session tokens; never runs against Postgres.
pub fn seed_dev_data(store: &InMemoryStore) {
    let admin = UserId::new();
    let owner = UserId::new();
    let company = CompanyId::new();

    store.seed_user(UserRecord {
        id: admin,
        email: "admin@fleetdesk.dev".to_string(),
        role: Role::Admin,
    });
    store.seed_user(UserRecord {
        id: owner,
        email: "owner@fleetdesk.dev".to_string(),
        role: Role::Owner,
    });
    store.seed_company(CompanyRecord {
        id: company,
        name: "Dev Fleet Co".to_string(),
        owner_id: owner,
    });

    let now = Utc::now();
    for (token, user) in [("dev-admin-token", admin), ("dev-owner-token", owner)] {
        store.seed_session(Session {
            token: SessionToken::new(token),
            user_id: user,
            created_at: now,
            expires_at: now + Duration::hours(12),
        });
    }

    tracing::warn!(
        company_id = %company,
        "in-memory dev store seeded; sessions: dev-admin-token, dev-owner-token"
    );
}
