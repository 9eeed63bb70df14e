use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use fleetdesk_api::app::{build_app, AppServices};
use fleetdesk_auth::{Role, Session, SessionToken};
use fleetdesk_core::{CompanyId, UserId};
use fleetdesk_infra::{CompanyRecord, InMemoryStore, UserRecord};

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let (services, store) = AppServices::in_memory();
        let app = build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    fn seed_user(&self, role: Role, token: &str) -> UserId {
        let id = UserId::new();
        self.store.seed_user(UserRecord {
            id,
            email: format!("{}@fleetdesk.test", token),
            role,
        });
        let now = Utc::now();
        self.store.seed_session(Session {
            token: SessionToken::new(token),
            user_id: id,
            created_at: now,
            expires_at: now + ChronoDuration::hours(8),
        });
        id
    }

    fn seed_company(&self, owner_id: UserId, name: &str) -> CompanyId {
        let id = CompanyId::new();
        self.store.seed_company(CompanyRecord {
            id,
            name: name.to_string(),
            owner_id,
        });
        id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owner of one company plus a client, pre-wired sessions.
struct Fixture {
    srv: TestServer,
    client_http: reqwest::Client,
    company: CompanyId,
    client_user: UserId,
}

impl Fixture {
    async fn new() -> Self {
        let srv = TestServer::spawn().await;
        let owner = srv.seed_user(Role::Owner, "owner-token");
        let company = srv.seed_company(owner, "Alpha Rentals");
        let client_user = srv.seed_user(Role::Client, "client-token");

        Self {
            srv,
            client_http: reqwest::Client::new(),
            company,
            client_user,
        }
    }

    async fn create_vehicle(&self, token: &str) -> serde_json::Value {
        let res = self
            .client_http
            .post(format!("{}/vehicles", self.srv.base_url))
            .bearer_auth(token)
            .json(&json!({
                "plate": "B 1234 XY",
                "model": "Dacia Logan",
                "daily_rate": 3000,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth("forged-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Health stays public.
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn whoami_reflects_resolved_scope() {
    let fx = Fixture::new().await;

    let res = fx
        .client_http
        .get(format!("{}/whoami", fx.srv.base_url))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["role"], "owner");
    assert_eq!(body["company_id"].as_str().unwrap(), fx.company.to_string());
}

#[tokio::test]
async fn owner_cannot_read_foreign_company_resources() {
    let fx = Fixture::new().await;
    let other_owner = fx.srv.seed_user(Role::Owner, "other-owner-token");
    let other_company = fx.srv.seed_company(other_owner, "Beta Cars");

    let res = fx
        .client_http
        .get(format!(
            "{}/vehicles?company_id={}",
            fx.srv.base_url, other_company
        ))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Denial body stays opaque.
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "access denied");
}

#[tokio::test]
async fn contract_lifecycle_with_optimistic_lock_over_http() {
    let fx = Fixture::new().await;

    let vehicle = fx.create_vehicle("owner-token").await;
    let vehicle_id = vehicle["id"].as_str().unwrap();
    let version_t0 = vehicle["version"].clone();

    // Create a contract supplying the version read at insert time.
    let res = fx
        .client_http
        .post(format!("{}/contracts", fx.srv.base_url))
        .bearer_auth("owner-token")
        .json(&json!({
            "client_id": fx.client_user,
            "vehicle_id": vehicle_id,
            "starts_on": "2025-07-01",
            "ends_on": "2025-07-08",
            "total_amount": 4200,
            "deposit_amount": 1000,
            "vehicle_version": version_t0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let contract_id = body["contract"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["contract"]["status"], "active");
    assert!(body["warnings"].as_array().unwrap().is_empty());

    // Replaying the stale version is a 409, not a duplicate contract.
    let res = fx
        .client_http
        .post(format!("{}/contracts", fx.srv.base_url))
        .bearer_auth("owner-token")
        .json(&json!({
            "client_id": fx.client_user,
            "vehicle_id": vehicle_id,
            "starts_on": "2025-07-09",
            "ends_on": "2025-07-12",
            "total_amount": 1800,
            "deposit_amount": 500,
            "vehicle_version": version_t0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Without a version: the fallback reads fresh, but the vehicle is rented.
    let res = fx
        .client_http
        .post(format!("{}/contracts", fx.srv.base_url))
        .bearer_auth("owner-token")
        .json(&json!({
            "client_id": fx.client_user,
            "vehicle_id": vehicle_id,
            "starts_on": "2025-07-09",
            "ends_on": "2025-07-12",
            "total_amount": 1800,
            "deposit_amount": 500,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The two standard payment rows exist, pending.
    let res = fx
        .client_http
        .get(format!("{}/payments", fx.srv.base_url))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let payments = body["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().all(|p| p["status"] == "pending"));

    // Close with fees; known label classifies, free-form falls back to other.
    let res = fx
        .client_http
        .post(format!(
            "{}/contracts/{}/close",
            fx.srv.base_url, contract_id
        ))
        .bearer_auth("owner-token")
        .json(&json!({
            "fees": [
                { "label": "fuel", "amount": 250 },
                { "label": "scratched bumper", "amount": 1500 },
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["contract"]["status"], "completed");

    // Vehicle is available again.
    let res = fx
        .client_http
        .get(format!("{}/vehicles/{}", fx.srv.base_url, vehicle_id))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "available");

    // Double close is rejected.
    let res = fx
        .client_http
        .post(format!(
            "{}/contracts/{}/close",
            fx.srv.base_url, contract_id
        ))
        .bearer_auth("owner-token")
        .json(&json!({ "fees": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The audit trail saw the lifecycle; owner reads it scoped.
    let res = fx
        .client_http
        .get(format!("{}/audit", fx.srv.base_url))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let records = body["records"].as_array().unwrap();
    assert!(records
        .iter()
        .any(|r| r["entity"] == "contract" && r["action"] == "create"));
    assert!(records
        .iter()
        .any(|r| r["entity"] == "contract" && r["action"] == "update"));
}

#[tokio::test]
async fn admin_mode_scopes_admin_to_entered_company() {
    let fx = Fixture::new().await;
    fx.srv.seed_user(Role::Admin, "admin-token");
    let other_owner = fx.srv.seed_user(Role::Owner, "other-owner-token");
    let other_company = fx.srv.seed_company(other_owner, "Beta Cars");

    // Without entering, the explicit pair grants nothing.
    let res = fx
        .client_http
        .get(format!("{}/vehicles", fx.srv.base_url))
        .bearer_auth("admin-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", fx.company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Enter Admin Mode for the fixture company.
    let res = fx
        .client_http
        .post(format!("{}/admin-mode/enter", fx.srv.base_url))
        .bearer_auth("admin-token")
        .json(&json!({ "company_id": fx.company }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Scoped view now works without naming the company in the query.
    let res = fx
        .client_http
        .get(format!("{}/vehicles", fx.srv.base_url))
        .bearer_auth("admin-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", fx.company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The marker pins the company: requesting another one is denied.
    let res = fx
        .client_http
        .get(format!("{}/vehicles", fx.srv.base_url))
        .bearer_auth("admin-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", other_company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // While impersonating, a foreign company in the query is denied too.
    let res = fx
        .client_http
        .get(format!(
            "{}/vehicles?company_id={}",
            fx.srv.base_url, other_company
        ))
        .bearer_auth("admin-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", fx.company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Exit; the stale pair stops working.
    let res = fx
        .client_http
        .post(format!("{}/admin-mode/exit", fx.srv.base_url))
        .bearer_auth("admin-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = fx
        .client_http
        .get(format!("{}/vehicles", fx.srv.base_url))
        .bearer_auth("admin-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", fx.company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // A global admin (no admin-mode headers) still reads any company
    // explicitly.
    let res = fx
        .client_http
        .get(format!(
            "{}/vehicles?company_id={}",
            fx.srv.base_url, other_company
        ))
        .bearer_auth("admin-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn impersonation_never_leaks_into_owner_scope() {
    let fx = Fixture::new().await;
    let other_owner = fx.srv.seed_user(Role::Owner, "other-owner-token");
    let other_company = fx.srv.seed_company(other_owner, "Beta Cars");

    // An owner sending the admin-mode pair stays bound to its own company.
    let res = fx
        .client_http
        .get(format!("{}/whoami", fx.srv.base_url))
        .bearer_auth("owner-token")
        .header("x-admin-mode", "1")
        .header("x-admin-company", other_company.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["company_id"].as_str().unwrap(), fx.company.to_string());
}

#[tokio::test]
async fn clients_create_bookings_but_not_vehicles() {
    let fx = Fixture::new().await;
    let vehicle = fx.create_vehicle("owner-token").await;
    let vehicle_id = vehicle["id"].as_str().unwrap();

    // Client books the vehicle.
    let res = fx
        .client_http
        .post(format!("{}/bookings", fx.srv.base_url))
        .bearer_auth("client-token")
        .json(&json!({
            "vehicle_id": vehicle_id,
            "starts_on": "2025-08-01",
            "ends_on": "2025-08-05",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let booking: serde_json::Value = res.json().await.unwrap();
    assert_eq!(booking["status"], "pending");
    assert_eq!(
        booking["client_id"].as_str().unwrap(),
        fx.client_user.to_string()
    );

    // The booking shows up in the client's own list.
    let res = fx
        .client_http
        .get(format!("{}/bookings", fx.srv.base_url))
        .bearer_auth("client-token")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);

    // Vehicle creation is staff-only.
    let res = fx
        .client_http
        .post(format!("{}/vehicles", fx.srv.base_url))
        .bearer_auth("client-token")
        .json(&json!({
            "plate": "B 9999 ZZ",
            "model": "Renault Clio",
            "daily_rate": 2500,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Owner fulfills the booking into a contract.
    let booking_id = booking["id"].as_str().unwrap();
    let res = fx
        .client_http
        .post(format!("{}/contracts", fx.srv.base_url))
        .bearer_auth("owner-token")
        .json(&json!({
            "client_id": fx.client_user,
            "vehicle_id": vehicle_id,
            "starts_on": "2025-08-01",
            "ends_on": "2025-08-05",
            "total_amount": 1500,
            "deposit_amount": 500,
            "booking_id": booking_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = fx
        .client_http
        .get(format!("{}/bookings", fx.srv.base_url))
        .bearer_auth("client-token")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["bookings"][0]["status"], "fulfilled");
}

#[tokio::test]
async fn audit_clear_is_privileged_and_audited() {
    let fx = Fixture::new().await;
    fx.create_vehicle("owner-token").await;

    // Clients cannot touch the audit trail.
    let res = fx
        .client_http
        .delete(format!("{}/audit", fx.srv.base_url))
        .bearer_auth("client-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // The owner clears its own trail; the clearing itself is recorded.
    let res = fx
        .client_http
        .delete(format!("{}/audit", fx.srv.base_url))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["cleared"], 1);

    let res = fx
        .client_http
        .get(format!("{}/audit", fx.srv.base_url))
        .bearer_auth("owner-token")
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["entity"], "audit_log");
    assert_eq!(records[0]["action"], "delete");
}
