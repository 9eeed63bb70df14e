//! End-to-end tests over the in-memory adapter: access resolution,
//! impersonation, the permission gate, and both contract workflows.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use fleetdesk_audit::{AuditAction, AuditEntity, AuditRecorder, AuditSink, NewAuditRecord};
use fleetdesk_auth::{
    AccessContext, AdminModeRequest, ImpersonationMarker, Role, Session, SessionToken,
};
use fleetdesk_core::{CompanyId, UserId, VehicleId};
use fleetdesk_rental::{ContractStatus, PaymentKind, PaymentStatus, RentalPeriod, VehicleStatus};

use crate::access::{AccessError, AccessResolver};
use crate::audit_sink::StoreAuditSink;
use crate::store::memory::InMemoryStore;
use crate::store::{
    AuditLogStore, CompanyRecord, DirectoryStore, NewVehicle, RentalStore, UserRecord,
};
use crate::workflow::{ClosingFee, CreateContractInput, RentalWorkflows, WorkflowError};

struct TestEnv {
    store: Arc<InMemoryStore>,
    resolver: AccessResolver,
    workflows: RentalWorkflows,
    admin: UserId,
    owner_a: UserId,
    manager_a: UserId,
    client: UserId,
    company_a: CompanyId,
    company_b: CompanyId,
}

impl TestEnv {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());

        let admin = UserId::new();
        let owner_a = UserId::new();
        let owner_b = UserId::new();
        let manager_a = UserId::new();
        let client = UserId::new();
        let company_a = CompanyId::new();
        let company_b = CompanyId::new();

        store.seed_user(UserRecord {
            id: admin,
            email: "admin@fleetdesk.test".to_string(),
            role: Role::Admin,
        });
        store.seed_user(UserRecord {
            id: owner_a,
            email: "owner-a@fleetdesk.test".to_string(),
            role: Role::Owner,
        });
        store.seed_user(UserRecord {
            id: owner_b,
            email: "owner-b@fleetdesk.test".to_string(),
            role: Role::Owner,
        });
        store.seed_user(UserRecord {
            id: manager_a,
            email: "manager-a@fleetdesk.test".to_string(),
            role: Role::Manager,
        });
        store.seed_user(UserRecord {
            id: client,
            email: "client@fleetdesk.test".to_string(),
            role: Role::Client,
        });

        store.seed_company(CompanyRecord {
            id: company_a,
            name: "Alpha Rentals".to_string(),
            owner_id: owner_a,
        });
        store.seed_company(CompanyRecord {
            id: company_b,
            name: "Beta Cars".to_string(),
            owner_id: owner_b,
        });
        store.seed_manager(manager_a, company_a);

        let now = Utc::now();
        for (token, user) in [
            ("admin-token", admin),
            ("owner-a-token", owner_a),
            ("manager-a-token", manager_a),
            ("client-token", client),
        ] {
            store.seed_session(Session {
                token: SessionToken::new(token),
                user_id: user,
                created_at: now,
                expires_at: now + Duration::hours(8),
            });
        }

        let directory: Arc<dyn DirectoryStore> = store.clone();
        let rentals: Arc<dyn RentalStore> = store.clone();
        let audit_store: Arc<dyn AuditLogStore> = store.clone();

        let resolver = AccessResolver::new(directory);
        let recorder = AuditRecorder::new(Arc::new(StoreAuditSink::new(audit_store)));
        let workflows = RentalWorkflows::new(rentals, recorder);

        Self {
            store,
            resolver,
            workflows,
            admin,
            owner_a,
            manager_a,
            client,
            company_a,
            company_b,
        }
    }

    async fn resolve(&self, token: &str) -> AccessContext {
        self.resolver
            .resolve(
                Some(&SessionToken::new(token)),
                &AdminModeRequest::off(),
                Utc::now(),
            )
            .await
            .expect("context should resolve")
    }

    async fn add_vehicle(&self, company: CompanyId) -> VehicleId {
        self.store
            .insert_vehicle(NewVehicle {
                company_id: company,
                plate: "B 1234 XY".to_string(),
                model: "Dacia Logan".to_string(),
                daily_rate: 3000,
            })
            .await
            .expect("vehicle insert")
            .id
    }

    fn period(&self) -> RentalPeriod {
        RentalPeriod::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 8).unwrap(),
        )
        .unwrap()
    }

    fn create_input(&self, vehicle_id: VehicleId) -> CreateContractInput {
        CreateContractInput {
            client_id: self.client,
            vehicle_id,
            period: self.period(),
            total_amount: 4200,
            deposit_amount: 1000,
            booking_id: None,
            vehicle_version: None,
        }
    }
}

#[tokio::test]
async fn missing_session_resolves_to_no_session_and_writes_nothing() {
    let env = TestEnv::new();

    let err = env
        .resolver
        .resolve(None, &AdminModeRequest::off(), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err, AccessError::NoSession);

    let err = env
        .resolver
        .resolve(
            Some(&SessionToken::new("forged-token")),
            &AdminModeRequest::off(),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, AccessError::NoSession);

    // Nothing was written anywhere on the failed resolutions.
    let audit = env.store.list_audit(None, 100).await.unwrap();
    assert!(audit.is_empty());
}

#[tokio::test]
async fn expired_session_is_no_session() {
    let env = TestEnv::new();
    let now = Utc::now();
    env.store.seed_session(Session {
        token: SessionToken::new("stale"),
        user_id: env.owner_a,
        created_at: now - Duration::hours(10),
        expires_at: now - Duration::hours(2),
    });

    let err = env
        .resolver
        .resolve(Some(&SessionToken::new("stale")), &AdminModeRequest::off(), now)
        .await
        .unwrap_err();
    assert_eq!(err, AccessError::NoSession);
}

#[tokio::test]
async fn scope_resolution_is_idempotent() {
    let env = TestEnv::new();

    let first = env.resolve("manager-a-token").await;
    let second = env.resolve("manager-a-token").await;

    assert_eq!(first, second);
    assert_eq!(first.scope.role, Role::Manager);
    assert_eq!(first.scope.company_id, Some(env.company_a));
}

#[tokio::test]
async fn owner_cannot_touch_foreign_company_with_or_without_marker() {
    let env = TestEnv::new();
    let foreign_vehicle = env.add_vehicle(env.company_b).await;

    let ctx = env.resolve("owner-a-token").await;
    let err = env
        .workflows
        .create_contract(&ctx, env.create_input(foreign_vehicle))
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::Forbidden);

    // A (tampered) marker naming the foreign company changes nothing for a
    // non-admin principal, even when the request carries the admin-mode pair.
    env.store
        .put_impersonation(ImpersonationMarker {
            admin_id: env.owner_a,
            company_id: env.company_b,
            issued_at: Utc::now(),
        })
        .await
        .unwrap();

    let ctx = env
        .resolver
        .resolve(
            Some(&SessionToken::new("owner-a-token")),
            &AdminModeRequest::entering(env.company_b),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(ctx.scope.company_id, Some(env.company_a));

    let err = env
        .workflows
        .create_contract(&ctx, env.create_input(foreign_vehicle))
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::Forbidden);
}

#[tokio::test]
async fn admin_mode_grants_scoped_view_and_keeps_real_role_in_audit() {
    let env = TestEnv::new();
    let vehicle_a = env.add_vehicle(env.company_a).await;
    let vehicle_b = env.add_vehicle(env.company_b).await;

    // Enter Admin Mode for company A.
    let admin_identity = env
        .resolver
        .resolve_identity(Some(&SessionToken::new("admin-token")), Utc::now())
        .await
        .unwrap();
    env.resolver
        .enter_admin_mode(&admin_identity, env.company_a, Utc::now())
        .await
        .unwrap();

    let ctx = env
        .resolver
        .resolve(
            Some(&SessionToken::new("admin-token")),
            &AdminModeRequest::entering(env.company_a),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(ctx.scope.role, Role::Admin);
    assert_eq!(ctx.scope.company_id, Some(env.company_a));

    // Scoped to company A: allowed.
    let done = env
        .workflows
        .create_contract(&ctx, env.create_input(vehicle_a))
        .await
        .unwrap();
    assert!(done.warnings.is_empty());

    // Scoped to company B: denied while impersonating A.
    let err = env
        .workflows
        .create_contract(&ctx, env.create_input(vehicle_b))
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::Forbidden);

    // The audit row carries the real role and the impersonated company.
    let audit = env.store.list_audit(Some(env.company_a), 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].role, Role::Admin);
    assert_eq!(audit[0].company_id, Some(env.company_a));
    assert_eq!(audit[0].entity, AuditEntity::Contract);
    assert_eq!(audit[0].action, AuditAction::Create);

    // Requesting a company the marker does not name is rejected outright.
    let err = env
        .resolver
        .resolve(
            Some(&SessionToken::new("admin-token")),
            &AdminModeRequest::entering(env.company_b),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ImpersonationRejected(_)));

    // After exiting, the stale request pair grants nothing.
    env.resolver.exit_admin_mode(env.admin).await.unwrap();
    let err = env
        .resolver
        .resolve(
            Some(&SessionToken::new("admin-token")),
            &AdminModeRequest::entering(env.company_a),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ImpersonationRejected(_)));
}

#[tokio::test]
async fn create_contract_happy_path_matches_expected_effects() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let t0 = env
        .store
        .find_vehicle(vehicle_id)
        .await
        .unwrap()
        .unwrap()
        .version;

    let ctx = env.resolve("owner-a-token").await;
    let done = env
        .workflows
        .create_contract(&ctx, env.create_input(vehicle_id))
        .await
        .unwrap();
    assert!(done.warnings.is_empty());

    let contract = done.value;
    assert_eq!(contract.status, ContractStatus::Active);
    assert_eq!(contract.company_id, env.company_a);
    assert_eq!(contract.manager_id, env.owner_a);

    let vehicle = env.store.find_vehicle(vehicle_id).await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Rented);
    assert!(vehicle.version > t0);

    let payments = env.store.list_payments(env.company_a).await.unwrap();
    assert_eq!(payments.len(), 2);
    let rental = payments.iter().find(|p| p.kind == PaymentKind::Rental).unwrap();
    assert_eq!(rental.amount, 4200);
    assert_eq!(rental.status, PaymentStatus::Pending);
    let deposit = payments.iter().find(|p| p.kind == PaymentKind::Deposit).unwrap();
    assert_eq!(deposit.amount, 1000);

    let audit = env.store.list_audit(Some(env.company_a), 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].entity, AuditEntity::Contract);
    assert_eq!(audit[0].action, AuditAction::Create);
    assert_eq!(audit[0].role, Role::Owner);
}

#[tokio::test]
async fn concurrent_creates_on_same_token_produce_exactly_one_contract() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let t0 = env
        .store
        .find_vehicle(vehicle_id)
        .await
        .unwrap()
        .unwrap()
        .version;

    let owner_ctx = env.resolve("owner-a-token").await;
    let manager_ctx = env.resolve("manager-a-token").await;

    let mut input_a = env.create_input(vehicle_id);
    input_a.vehicle_version = Some(t0);
    let mut input_b = env.create_input(vehicle_id);
    input_b.vehicle_version = Some(t0);

    let (a, b) = tokio::join!(
        env.workflows.create_contract(&owner_ctx, input_a),
        env.workflows.create_contract(&manager_ctx, input_b),
    );

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one concurrent create must win");

    let loser = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one call must lose");
    assert!(
        matches!(
            loser,
            WorkflowError::Conflict { .. } | WorkflowError::VehicleUnavailable { .. }
        ),
        "loser must see the conflict, got {loser:?}"
    );

    // One contract row, one status transition.
    let contracts = env.store.list_contracts(env.company_a).await.unwrap();
    assert_eq!(contracts.len(), 1);
    let vehicle = env.store.find_vehicle(vehicle_id).await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Rented);
}

#[tokio::test]
async fn stale_token_conflicts_even_without_contention() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let t0 = env
        .store
        .find_vehicle(vehicle_id)
        .await
        .unwrap()
        .unwrap()
        .version;

    let ctx = env.resolve("owner-a-token").await;

    let mut first = env.create_input(vehicle_id);
    first.vehicle_version = Some(t0);
    env.workflows.create_contract(&ctx, first).await.unwrap();

    // Replaying the old token after the row moved on is a conflict, not an
    // availability error: the caller must re-fetch before learning more.
    let mut replay = env.create_input(vehicle_id);
    replay.vehicle_version = Some(t0);
    let err = env.workflows.create_contract(&ctx, replay).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict { .. }));
}

#[tokio::test]
async fn rented_vehicle_is_unavailable_with_fresh_token() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let ctx = env.resolve("owner-a-token").await;

    env.workflows
        .create_contract(&ctx, env.create_input(vehicle_id))
        .await
        .unwrap();

    // Fresh read, fresh token: the version matches but the vehicle is gone.
    let err = env
        .workflows
        .create_contract(&ctx, env.create_input(vehicle_id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::VehicleUnavailable {
            status: VehicleStatus::Rented
        }
    ));
}

#[tokio::test]
async fn close_contract_frees_vehicle_and_double_close_is_rejected() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let ctx = env.resolve("manager-a-token").await;

    let contract = env
        .workflows
        .create_contract(&ctx, env.create_input(vehicle_id))
        .await
        .unwrap()
        .value;
    assert_eq!(contract.manager_id, env.manager_a);

    let fees = vec![
        ClosingFee {
            label: "fuel".to_string(),
            amount: 250,
        },
        ClosingFee {
            label: "scratched bumper".to_string(),
            amount: 1500,
        },
    ];
    let closed = env
        .workflows
        .close_contract(&ctx, contract.id, fees)
        .await
        .unwrap();
    assert!(closed.warnings.is_empty());
    assert_eq!(closed.value.status, ContractStatus::Completed);
    assert!(closed.value.closed_at.is_some());

    let vehicle = env.store.find_vehicle(vehicle_id).await.unwrap().unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Available);
    let version_after_close = vehicle.version;

    // Fees classified: known label to its kind, free-form to other.
    let payments = env.store.list_payments(env.company_a).await.unwrap();
    assert!(payments
        .iter()
        .any(|p| p.kind == PaymentKind::Fuel && p.amount == 250));
    assert!(payments
        .iter()
        .any(|p| p.kind == PaymentKind::Other && p.amount == 1500));

    // Second close: rejected, and the vehicle row does not move.
    let err = env
        .workflows
        .close_contract(&ctx, contract.id, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ContractClosed {
            status: ContractStatus::Completed
        }
    ));
    let vehicle = env.store.find_vehicle(vehicle_id).await.unwrap().unwrap();
    assert_eq!(vehicle.version, version_after_close);
}

#[tokio::test]
async fn booking_is_fulfilled_by_contract_and_cannot_fulfill_twice() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;

    let booking = env
        .store
        .insert_booking(crate::store::NewBooking {
            company_id: env.company_a,
            client_id: env.client,
            vehicle_id,
            period: env.period(),
        })
        .await
        .unwrap();

    let ctx = env.resolve("owner-a-token").await;
    let mut input = env.create_input(vehicle_id);
    input.booking_id = Some(booking.id);

    let contract = env.workflows.create_contract(&ctx, input).await.unwrap().value;

    let stored = env.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, fleetdesk_rental::BookingStatus::Fulfilled);

    // Close and try to reuse the fulfilled booking on the now-free vehicle.
    env.workflows
        .close_contract(&ctx, contract.id, Vec::new())
        .await
        .unwrap();

    let mut reuse = env.create_input(vehicle_id);
    reuse.booking_id = Some(booking.id);
    let err = env.workflows.create_contract(&ctx, reuse).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

struct FailingSink;

#[async_trait::async_trait]
impl AuditSink for FailingSink {
    async fn append(&self, _record: NewAuditRecord) -> Result<(), fleetdesk_audit::AuditError> {
        Err(fleetdesk_audit::AuditError::Append("sink down".to_string()))
    }
}

#[tokio::test]
async fn lost_audit_write_degrades_to_warning_not_failure() {
    let env = TestEnv::new();
    let vehicle_id = env.add_vehicle(env.company_a).await;
    let ctx = env.resolve("owner-a-token").await;

    let rentals: Arc<dyn RentalStore> = env.store.clone();
    let workflows = RentalWorkflows::new(rentals, AuditRecorder::new(Arc::new(FailingSink)));

    let done = workflows
        .create_contract(&ctx, env.create_input(vehicle_id))
        .await
        .expect("contract must commit even when the audit sink is down");

    assert_eq!(done.value.status, ContractStatus::Active);
    assert!(done.warnings.iter().any(|w| w.step == "audit"));

    // The business fact stands.
    let contracts = env.store.list_contracts(env.company_a).await.unwrap();
    assert_eq!(contracts.len(), 1);
}

#[tokio::test]
async fn clearing_audit_is_scoped() {
    let env = TestEnv::new();
    let vehicle_a = env.add_vehicle(env.company_a).await;
    let vehicle_b = env.add_vehicle(env.company_b).await;

    let ctx_a = env.resolve("owner-a-token").await;
    env.workflows
        .create_contract(&ctx_a, env.create_input(vehicle_a))
        .await
        .unwrap();

    let admin_identity = env
        .resolver
        .resolve_identity(Some(&SessionToken::new("admin-token")), Utc::now())
        .await
        .unwrap();
    env.resolver
        .enter_admin_mode(&admin_identity, env.company_b, Utc::now())
        .await
        .unwrap();
    let ctx_admin = env
        .resolver
        .resolve(
            Some(&SessionToken::new("admin-token")),
            &AdminModeRequest::entering(env.company_b),
            Utc::now(),
        )
        .await
        .unwrap();
    env.workflows
        .create_contract(&ctx_admin, env.create_input(vehicle_b))
        .await
        .unwrap();

    // Clearing company B leaves company A's trail untouched.
    let removed = env.store.clear_audit(Some(env.company_b)).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        env.store.list_audit(Some(env.company_a), 10).await.unwrap().len(),
        1
    );
    assert!(env
        .store
        .list_audit(Some(env.company_b), 10)
        .await
        .unwrap()
        .is_empty());
}
