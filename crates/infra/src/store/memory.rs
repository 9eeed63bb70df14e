//! In-memory store adapter.
//!
//! Intended for tests/dev. A single `RwLock` over the whole state makes the
//! atomic units trivially transactional; not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fleetdesk_audit::{AuditRecord, NewAuditRecord};
use fleetdesk_auth::{ImpersonationMarker, Session, SessionToken};
use fleetdesk_core::{
    BookingId, CompanyId, ContractId, PaymentId, UserId, VehicleId, VersionToken,
};
use fleetdesk_rental::{
    Booking, BookingStatus, Contract, ContractStatus, Payment, PaymentStatus, Vehicle,
    VehicleStatus,
};

use super::{
    AuditLogStore, CompanyRecord, ContractDraft, DirectoryStore, NewBooking, NewPayment,
    NewVehicle, RentalStore, StoreError, TxError, UserRecord,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserRecord>,
    companies: HashMap<CompanyId, CompanyRecord>,
    /// manager user -> company (active memberships only).
    managers: HashMap<UserId, CompanyId>,
    sessions: HashMap<String, Session>,
    impersonations: HashMap<UserId, ImpersonationMarker>,
    vehicles: HashMap<VehicleId, Vehicle>,
    bookings: HashMap<BookingId, Booking>,
    contracts: HashMap<ContractId, Contract>,
    payments: Vec<Payment>,
    audit: Vec<AuditRecord>,
}

/// In-memory implementation of all three storage ports.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    // Seeding helpers for tests and the dev dataset. These bypass the
    // workflow engine on purpose; nothing outside tests/dev wiring calls them.

    pub fn seed_user(&self, user: UserRecord) {
        if let Ok(mut s) = self.state.write() {
            s.users.insert(user.id, user);
        }
    }

    pub fn seed_company(&self, company: CompanyRecord) {
        if let Ok(mut s) = self.state.write() {
            s.companies.insert(company.id, company);
        }
    }

    pub fn seed_manager(&self, manager_id: UserId, company_id: CompanyId) {
        if let Ok(mut s) = self.state.write() {
            s.managers.insert(manager_id, company_id);
        }
    }

    pub fn seed_session(&self, session: Session) {
        if let Ok(mut s) = self.state.write() {
            s.sessions.insert(session.token.as_str().to_string(), session);
        }
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(token.as_str()).cloned())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn company_exists(&self, id: CompanyId) -> Result<bool, StoreError> {
        Ok(self.read()?.companies.contains_key(&id))
    }

    async fn owned_company(&self, owner_id: UserId) -> Result<Option<CompanyId>, StoreError> {
        Ok(self
            .read()?
            .companies
            .values()
            .find(|c| c.owner_id == owner_id)
            .map(|c| c.id))
    }

    async fn managed_company(&self, manager_id: UserId) -> Result<Option<CompanyId>, StoreError> {
        Ok(self.read()?.managers.get(&manager_id).copied())
    }

    async fn put_impersonation(&self, marker: ImpersonationMarker) -> Result<(), StoreError> {
        self.write()?.impersonations.insert(marker.admin_id, marker);
        Ok(())
    }

    async fn find_impersonation(
        &self,
        admin_id: UserId,
    ) -> Result<Option<ImpersonationMarker>, StoreError> {
        Ok(self.read()?.impersonations.get(&admin_id).cloned())
    }

    async fn clear_impersonation(&self, admin_id: UserId) -> Result<(), StoreError> {
        self.write()?.impersonations.remove(&admin_id);
        Ok(())
    }
}

#[async_trait]
impl RentalStore for InMemoryStore {
    async fn insert_vehicle(&self, vehicle: NewVehicle) -> Result<Vehicle, StoreError> {
        let now = Utc::now();
        let row = Vehicle {
            id: VehicleId::new(),
            company_id: vehicle.company_id,
            plate: vehicle.plate,
            model: vehicle.model,
            daily_rate: vehicle.daily_rate,
            status: VehicleStatus::Available,
            version: VersionToken::initial(now),
            created_at: now,
        };
        self.write()?.vehicles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.read()?.vehicles.get(&id).cloned())
    }

    async fn list_vehicles(&self, company_id: CompanyId) -> Result<Vec<Vehicle>, StoreError> {
        let mut rows: Vec<Vehicle> = self
            .read()?
            .vehicles
            .values()
            .filter(|v| v.company_id == company_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.created_at);
        Ok(rows)
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let row = Booking {
            id: BookingId::new(),
            company_id: booking.company_id,
            client_id: booking.client_id,
            vehicle_id: booking.vehicle_id,
            period: booking.period,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        };
        self.write()?.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.read()?.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, company_id: CompanyId) -> Result<Vec<Booking>, StoreError> {
        let mut rows: Vec<Booking> = self
            .read()?
            .bookings
            .values()
            .filter(|b| b.company_id == company_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.created_at);
        Ok(rows)
    }

    async fn list_client_bookings(&self, client_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let mut rows: Vec<Booking> = self
            .read()?
            .bookings
            .values()
            .filter(|b| b.client_id == client_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.created_at);
        Ok(rows)
    }

    async fn find_contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        Ok(self.read()?.contracts.get(&id).cloned())
    }

    async fn list_contracts(&self, company_id: CompanyId) -> Result<Vec<Contract>, StoreError> {
        let mut rows: Vec<Contract> = self
            .read()?
            .contracts
            .values()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let row = Payment {
            id: PaymentId::new(),
            company_id: payment.company_id,
            contract_id: payment.contract_id,
            kind: payment.kind,
            label: payment.label,
            amount: payment.amount,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        self.write()?.payments.push(row.clone());
        Ok(row)
    }

    async fn list_payments(&self, company_id: CompanyId) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .read()?
            .payments
            .iter()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn commit_contract(
        &self,
        draft: ContractDraft,
        expected: VersionToken,
    ) -> Result<Contract, TxError> {
        let now = Utc::now();
        let mut state = self.write().map_err(TxError::Store)?;

        // Everything below happens under the single write lock, which is what
        // makes this adapter's atomic unit atomic.
        let vehicle = state
            .vehicles
            .get(&draft.vehicle_id)
            .cloned()
            .ok_or(TxError::NotFound)?;

        if vehicle.company_id != draft.company_id {
            return Err(TxError::CompanyIsolation(
                "vehicle belongs to a different company".to_string(),
            ));
        }

        if vehicle.version != expected {
            return Err(TxError::VersionConflict {
                expected,
                found: vehicle.version,
            });
        }

        if vehicle.begin_rental().is_err() {
            return Err(TxError::VehicleUnavailable {
                status: vehicle.status,
            });
        }

        if let Some(booking_id) = draft.booking_id {
            let booking = state
                .bookings
                .get(&booking_id)
                .ok_or_else(|| TxError::BookingRejected("booking not found".to_string()))?;
            if booking.company_id != draft.company_id || booking.vehicle_id != draft.vehicle_id {
                return Err(TxError::BookingRejected(
                    "booking does not match this contract".to_string(),
                ));
            }
            booking
                .ensure_fulfillable()
                .map_err(|e| TxError::BookingRejected(e.to_string()))?;
        }

        let contract = Contract {
            id: draft.id,
            company_id: draft.company_id,
            client_id: draft.client_id,
            vehicle_id: draft.vehicle_id,
            manager_id: draft.manager_id,
            period: draft.period,
            total_amount: draft.total_amount,
            deposit_amount: draft.deposit_amount,
            status: ContractStatus::Active,
            created_at: now,
            closed_at: None,
        };

        let stored = state
            .vehicles
            .get_mut(&draft.vehicle_id)
            .ok_or(TxError::NotFound)?;
        stored.status = VehicleStatus::Rented;
        stored.version = stored.version.bumped(now);

        if let Some(booking_id) = draft.booking_id {
            if let Some(b) = state.bookings.get_mut(&booking_id) {
                b.status = BookingStatus::Fulfilled;
            }
        }

        state.contracts.insert(contract.id, contract.clone());
        Ok(contract)
    }

    async fn commit_contract_close(&self, id: ContractId) -> Result<Contract, TxError> {
        let now = Utc::now();
        let mut state = self.write().map_err(TxError::Store)?;

        let contract = state.contracts.get(&id).cloned().ok_or(TxError::NotFound)?;
        if contract.status.is_terminal() {
            return Err(TxError::AlreadyClosed {
                status: contract.status,
            });
        }

        if let Some(vehicle) = state.vehicles.get_mut(&contract.vehicle_id) {
            // Closing always frees the vehicle.
            vehicle.status = vehicle.end_rental().unwrap_or(VehicleStatus::Available);
            vehicle.version = vehicle.version.bumped(now);
        }

        let stored = state.contracts.get_mut(&id).ok_or(TxError::NotFound)?;
        stored.status = ContractStatus::Completed;
        stored.closed_at = Some(now);
        Ok(stored.clone())
    }
}

#[async_trait]
impl AuditLogStore for InMemoryStore {
    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        let row = AuditRecord {
            id: Uuid::now_v7(),
            actor_id: record.actor_id,
            role: record.role,
            company_id: record.company_id,
            entity: record.entity,
            entity_id: record.entity_id,
            action: record.action,
            before_state: record.before_state,
            after_state: record.after_state,
            created_at: Utc::now(),
        };
        self.write()?.audit.push(row.clone());
        Ok(row)
    }

    async fn list_audit(
        &self,
        company_id: Option<CompanyId>,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<AuditRecord> = state
            .audit
            .iter()
            .filter(|r| company_id.is_none() || r.company_id == company_id)
            .cloned()
            .collect();
        rows.reverse();
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn clear_audit(&self, company_id: Option<CompanyId>) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let before = state.audit.len();
        match company_id {
            None => state.audit.clear(),
            Some(c) => state.audit.retain(|r| r.company_id != Some(c)),
        }
        Ok((before - state.audit.len()) as u64)
    }
}
