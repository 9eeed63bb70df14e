//! Postgres-backed store adapter.
//!
//! Tables are conventional (`users`, `managers`, `companies`, `company_cars`,
//! `contracts`, `bookings`, `payments`, `audit_logs`, `sessions`,
//! `admin_mode_markers`). The optimistic lock on a vehicle is its
//! `updated_at` column: availability-changing writes are conditional
//! (`WHERE updated_at = $expected`) inside a transaction, so a concurrent
//! writer makes the update touch zero rows and the whole unit rolls back.
//!
//! ## Error mapping
//!
//! SQLx errors map to [`StoreError`]: unique violations (code 23505) become
//! `Conflict`, everything else `Backend`. Row decoding failures are backend
//! errors; they indicate schema drift, not user input.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use fleetdesk_audit::{AuditAction, AuditEntity, AuditRecord, NewAuditRecord};
use fleetdesk_auth::{ImpersonationMarker, Role, Session, SessionToken};
use fleetdesk_core::{
    BookingId, CompanyId, ContractId, PaymentId, UserId, VehicleId, VersionToken,
};
use fleetdesk_rental::{
    Booking, BookingStatus, Contract, ContractStatus, Payment, PaymentKind, PaymentStatus,
    RentalPeriod, Vehicle, VehicleStatus,
};

use async_trait::async_trait;

use super::{
    AuditLogStore, ContractDraft, DirectoryStore, NewBooking, NewPayment, NewVehicle, RentalStore,
    StoreError, TxError, UserRecord,
};

/// Postgres implementation of all three storage ports.
///
/// `Send + Sync`; clones share the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn decode_error(operation: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode row in {operation}: {err}"))
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, StoreError> {
    let status: String = row.try_get("status").map_err(|e| decode_error("vehicle", e))?;
    Ok(Vehicle {
        id: VehicleId::from_uuid(row.try_get("id").map_err(|e| decode_error("vehicle", e))?),
        company_id: CompanyId::from_uuid(
            row.try_get("company_id").map_err(|e| decode_error("vehicle", e))?,
        ),
        plate: row.try_get("plate").map_err(|e| decode_error("vehicle", e))?,
        model: row.try_get("model").map_err(|e| decode_error("vehicle", e))?,
        daily_rate: row
            .try_get::<i64, _>("daily_rate")
            .map_err(|e| decode_error("vehicle", e))? as u64,
        status: VehicleStatus::parse(&status).map_err(|e| decode_error("vehicle", e))?,
        version: VersionToken::new(
            row.try_get::<DateTime<Utc>, _>("updated_at")
                .map_err(|e| decode_error("vehicle", e))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_error("vehicle", e))?,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status").map_err(|e| decode_error("booking", e))?;
    let starts_on = row
        .try_get("starts_on")
        .map_err(|e| decode_error("booking", e))?;
    let ends_on = row
        .try_get("ends_on")
        .map_err(|e| decode_error("booking", e))?;
    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id").map_err(|e| decode_error("booking", e))?),
        company_id: CompanyId::from_uuid(
            row.try_get("company_id").map_err(|e| decode_error("booking", e))?,
        ),
        client_id: UserId::from_uuid(
            row.try_get("client_id").map_err(|e| decode_error("booking", e))?,
        ),
        vehicle_id: VehicleId::from_uuid(
            row.try_get("vehicle_id").map_err(|e| decode_error("booking", e))?,
        ),
        period: RentalPeriod::new(starts_on, ends_on)
            .map_err(|e| decode_error("booking", e))?,
        status: BookingStatus::parse(&status).map_err(|e| decode_error("booking", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_error("booking", e))?,
    })
}

fn contract_from_row(row: &PgRow) -> Result<Contract, StoreError> {
    let status: String = row.try_get("status").map_err(|e| decode_error("contract", e))?;
    let starts_on = row
        .try_get("starts_on")
        .map_err(|e| decode_error("contract", e))?;
    let ends_on = row
        .try_get("ends_on")
        .map_err(|e| decode_error("contract", e))?;
    Ok(Contract {
        id: ContractId::from_uuid(row.try_get("id").map_err(|e| decode_error("contract", e))?),
        company_id: CompanyId::from_uuid(
            row.try_get("company_id").map_err(|e| decode_error("contract", e))?,
        ),
        client_id: UserId::from_uuid(
            row.try_get("client_id").map_err(|e| decode_error("contract", e))?,
        ),
        vehicle_id: VehicleId::from_uuid(
            row.try_get("vehicle_id").map_err(|e| decode_error("contract", e))?,
        ),
        manager_id: UserId::from_uuid(
            row.try_get("manager_id").map_err(|e| decode_error("contract", e))?,
        ),
        period: RentalPeriod::new(starts_on, ends_on)
            .map_err(|e| decode_error("contract", e))?,
        total_amount: row
            .try_get::<i64, _>("total_amount")
            .map_err(|e| decode_error("contract", e))? as u64,
        deposit_amount: row
            .try_get::<i64, _>("deposit_amount")
            .map_err(|e| decode_error("contract", e))? as u64,
        status: ContractStatus::parse(&status).map_err(|e| decode_error("contract", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_error("contract", e))?,
        closed_at: row
            .try_get("closed_at")
            .map_err(|e| decode_error("contract", e))?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let kind: String = row.try_get("kind").map_err(|e| decode_error("payment", e))?;
    let status: String = row.try_get("status").map_err(|e| decode_error("payment", e))?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id").map_err(|e| decode_error("payment", e))?),
        company_id: CompanyId::from_uuid(
            row.try_get("company_id").map_err(|e| decode_error("payment", e))?,
        ),
        contract_id: ContractId::from_uuid(
            row.try_get("contract_id").map_err(|e| decode_error("payment", e))?,
        ),
        kind: PaymentKind::classify(&kind),
        label: row.try_get("label").map_err(|e| decode_error("payment", e))?,
        amount: row
            .try_get::<i64, _>("amount")
            .map_err(|e| decode_error("payment", e))? as u64,
        status: match status.as_str() {
            "paid" => PaymentStatus::Paid,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        },
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_error("payment", e))?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let role: String = row.try_get("role").map_err(|e| decode_error("audit", e))?;
    let entity: String = row
        .try_get("entity_type")
        .map_err(|e| decode_error("audit", e))?;
    let action: String = row.try_get("action").map_err(|e| decode_error("audit", e))?;
    Ok(AuditRecord {
        id: row.try_get("id").map_err(|e| decode_error("audit", e))?,
        actor_id: UserId::from_uuid(
            row.try_get("actor_id").map_err(|e| decode_error("audit", e))?,
        ),
        role: role.parse::<Role>().map_err(|e| decode_error("audit", e))?,
        company_id: row
            .try_get::<Option<uuid::Uuid>, _>("company_id")
            .map_err(|e| decode_error("audit", e))?
            .map(CompanyId::from_uuid),
        entity: parse_audit_entity(&entity)?,
        entity_id: row.try_get("entity_id").map_err(|e| decode_error("audit", e))?,
        action: parse_audit_action(&action)?,
        before_state: row
            .try_get("before_state")
            .map_err(|e| decode_error("audit", e))?,
        after_state: row
            .try_get("after_state")
            .map_err(|e| decode_error("audit", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_error("audit", e))?,
    })
}

fn parse_audit_entity(s: &str) -> Result<AuditEntity, StoreError> {
    match s {
        "vehicle" => Ok(AuditEntity::Vehicle),
        "booking" => Ok(AuditEntity::Booking),
        "contract" => Ok(AuditEntity::Contract),
        "payment" => Ok(AuditEntity::Payment),
        "company" => Ok(AuditEntity::Company),
        "user" => Ok(AuditEntity::User),
        "audit_log" => Ok(AuditEntity::AuditLog),
        other => Err(decode_error("audit", format!("unknown entity_type: {other}"))),
    }
}

fn parse_audit_action(s: &str) -> Result<AuditAction, StoreError> {
    match s {
        "create" => Ok(AuditAction::Create),
        "update" => Ok(AuditAction::Update),
        "delete" => Ok(AuditAction::Delete),
        "view" => Ok(AuditAction::View),
        other => Err(decode_error("audit", format!("unknown action: {other}"))),
    }
}

/// Re-read a vehicle row inside a transaction.
async fn vehicle_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: VehicleId,
) -> Result<Option<Vehicle>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, company_id, plate, model, daily_rate, status, updated_at, created_at
        FROM company_cars
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("vehicle_in_tx", e))?;

    row.as_ref().map(vehicle_from_row).transpose()
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    #[instrument(skip(self, token), err)]
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_session", e))?;

        row.map(|row| -> Result<Session, StoreError> {
            Ok(Session {
                token: SessionToken::new(
                    row.try_get::<String, _>("token")
                        .map_err(|e| decode_error("session", e))?,
                ),
                user_id: UserId::from_uuid(
                    row.try_get("user_id").map_err(|e| decode_error("session", e))?,
                ),
                created_at: row
                    .try_get("created_at")
                    .map_err(|e| decode_error("session", e))?,
                expires_at: row
                    .try_get("expires_at")
                    .map_err(|e| decode_error("session", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;

        row.map(|row| -> Result<UserRecord, StoreError> {
            let role: String = row.try_get("role").map_err(|e| decode_error("user", e))?;
            Ok(UserRecord {
                id: UserId::from_uuid(row.try_get("id").map_err(|e| decode_error("user", e))?),
                email: row.try_get("email").map_err(|e| decode_error("user", e))?,
                role: role.parse::<Role>().map_err(|e| decode_error("user", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn company_exists(&self, id: CompanyId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS present FROM companies WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("company_exists", e))?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn owned_company(&self, owner_id: UserId) -> Result<Option<CompanyId>, StoreError> {
        let row = sqlx::query("SELECT id FROM companies WHERE owner_id = $1 LIMIT 1")
            .bind(owner_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("owned_company", e))?;

        row.map(|row| {
            row.try_get("id")
                .map(CompanyId::from_uuid)
                .map_err(|e| decode_error("company", e))
        })
        .transpose()
    }

    #[instrument(skip(self), fields(manager_id = %manager_id), err)]
    async fn managed_company(&self, manager_id: UserId) -> Result<Option<CompanyId>, StoreError> {
        let row = sqlx::query(
            "SELECT company_id FROM managers WHERE user_id = $1 AND active LIMIT 1",
        )
        .bind(manager_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("managed_company", e))?;

        row.map(|row| {
            row.try_get("company_id")
                .map(CompanyId::from_uuid)
                .map_err(|e| decode_error("manager", e))
        })
        .transpose()
    }

    #[instrument(skip(self, marker), fields(admin_id = %marker.admin_id), err)]
    async fn put_impersonation(&self, marker: ImpersonationMarker) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO admin_mode_markers (admin_id, company_id, issued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (admin_id)
            DO UPDATE SET company_id = EXCLUDED.company_id, issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(marker.admin_id.as_uuid())
        .bind(marker.company_id.as_uuid())
        .bind(marker.issued_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put_impersonation", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(admin_id = %admin_id), err)]
    async fn find_impersonation(
        &self,
        admin_id: UserId,
    ) -> Result<Option<ImpersonationMarker>, StoreError> {
        let row = sqlx::query(
            "SELECT admin_id, company_id, issued_at FROM admin_mode_markers WHERE admin_id = $1",
        )
        .bind(admin_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_impersonation", e))?;

        row.map(|row| -> Result<ImpersonationMarker, StoreError> {
            Ok(ImpersonationMarker {
                admin_id: UserId::from_uuid(
                    row.try_get("admin_id").map_err(|e| decode_error("marker", e))?,
                ),
                company_id: CompanyId::from_uuid(
                    row.try_get("company_id").map_err(|e| decode_error("marker", e))?,
                ),
                issued_at: row
                    .try_get("issued_at")
                    .map_err(|e| decode_error("marker", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(admin_id = %admin_id), err)]
    async fn clear_impersonation(&self, admin_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM admin_mode_markers WHERE admin_id = $1")
            .bind(admin_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_impersonation", e))?;
        Ok(())
    }
}

#[async_trait]
impl RentalStore for PostgresStore {
    #[instrument(skip(self, vehicle), fields(company_id = %vehicle.company_id), err)]
    async fn insert_vehicle(&self, vehicle: NewVehicle) -> Result<Vehicle, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO company_cars (id, company_id, plate, model, daily_rate, status, updated_at, created_at)
            VALUES ($1, $2, $3, $4, $5, 'available', NOW(), NOW())
            RETURNING id, company_id, plate, model, daily_rate, status, updated_at, created_at
            "#,
        )
        .bind(VehicleId::new().as_uuid())
        .bind(vehicle.company_id.as_uuid())
        .bind(&vehicle.plate)
        .bind(&vehicle.model)
        .bind(vehicle.daily_rate as i64)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_vehicle", e))?;

        vehicle_from_row(&row)
    }

    #[instrument(skip(self), fields(vehicle_id = %id), err)]
    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, plate, model, daily_rate, status, updated_at, created_at
            FROM company_cars
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_vehicle", e))?;

        row.as_ref().map(vehicle_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_vehicles(&self, company_id: CompanyId) -> Result<Vec<Vehicle>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, plate, model, daily_rate, status, updated_at, created_at
            FROM company_cars
            WHERE company_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_vehicles", e))?;

        rows.iter().map(vehicle_from_row).collect()
    }

    #[instrument(skip(self, booking), fields(company_id = %booking.company_id), err)]
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO bookings (id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW())
            RETURNING id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at
            "#,
        )
        .bind(BookingId::new().as_uuid())
        .bind(booking.company_id.as_uuid())
        .bind(booking.client_id.as_uuid())
        .bind(booking.vehicle_id.as_uuid())
        .bind(booking.period.starts_on)
        .bind(booking.period.ends_on)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_booking", e))?;

        booking_from_row(&row)
    }

    #[instrument(skip(self), fields(booking_id = %id), err)]
    async fn find_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_booking", e))?;

        row.as_ref().map(booking_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_bookings(&self, company_id: CompanyId) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at
            FROM bookings
            WHERE company_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_bookings", e))?;

        rows.iter().map(booking_from_row).collect()
    }

    #[instrument(skip(self), fields(client_id = %client_id), err)]
    async fn list_client_bookings(&self, client_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at
            FROM bookings
            WHERE client_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(client_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_client_bookings", e))?;

        rows.iter().map(booking_from_row).collect()
    }

    #[instrument(skip(self), fields(contract_id = %id), err)]
    async fn find_contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, manager_id, starts_on, ends_on,
                   total_amount, deposit_amount, status, created_at, closed_at
            FROM contracts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_contract", e))?;

        row.as_ref().map(contract_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_contracts(&self, company_id: CompanyId) -> Result<Vec<Contract>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, manager_id, starts_on, ends_on,
                   total_amount, deposit_amount, status, created_at, closed_at
            FROM contracts
            WHERE company_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_contracts", e))?;

        rows.iter().map(contract_from_row).collect()
    }

    #[instrument(skip(self, payment), fields(contract_id = %payment.contract_id), err)]
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO payments (id, company_id, contract_id, kind, label, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW())
            RETURNING id, company_id, contract_id, kind, label, amount, status, created_at
            "#,
        )
        .bind(PaymentId::new().as_uuid())
        .bind(payment.company_id.as_uuid())
        .bind(payment.contract_id.as_uuid())
        .bind(payment.kind.as_str())
        .bind(&payment.label)
        .bind(payment.amount as i64)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;

        payment_from_row(&row)
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_payments(&self, company_id: CompanyId) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, contract_id, kind, label, amount, status, created_at
            FROM payments
            WHERE company_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_payments", e))?;

        rows.iter().map(payment_from_row).collect()
    }

    #[instrument(
        skip(self, draft),
        fields(vehicle_id = %draft.vehicle_id, company_id = %draft.company_id),
        err
    )]
    async fn commit_contract(
        &self,
        draft: ContractDraft,
        expected: VersionToken,
    ) -> Result<Contract, TxError> {
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("begin", e)))?;

        let vehicle = vehicle_in_tx(&mut tx, draft.vehicle_id)
            .await?
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

        // Compare-and-swap on updated_at. The row is locked above, so a zero
        // row count here means the expectation itself was stale.
        let new_version = vehicle.version.bumped(now);
        let updated = sqlx::query(
            r#"
            UPDATE company_cars
            SET status = 'rented', updated_at = $3
            WHERE id = $1 AND updated_at = $2
            "#,
        )
        .bind(draft.vehicle_id.as_uuid())
        .bind(expected.as_timestamp())
        .bind(new_version.as_timestamp())
        .execute(&mut *tx)
        .await
        .map_err(|e| TxError::Store(map_sqlx_error("flip_vehicle", e)))?;

        if updated.rows_affected() != 1 {
            return Err(TxError::VersionConflict {
                expected,
                found: vehicle.version,
            });
        }

        if let Some(booking_id) = draft.booking_id {
            let booking = sqlx::query(
                r#"
                SELECT id, company_id, client_id, vehicle_id, starts_on, ends_on, status, created_at
                FROM bookings
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(booking_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("load_booking", e)))?
            .as_ref()
            .map(booking_from_row)
            .transpose()?
            .ok_or_else(|| TxError::BookingRejected("booking not found".to_string()))?;

            if booking.company_id != draft.company_id || booking.vehicle_id != draft.vehicle_id {
                return Err(TxError::BookingRejected(
                    "booking does not match this contract".to_string(),
                ));
            }
            booking
                .ensure_fulfillable()
                .map_err(|e| TxError::BookingRejected(e.to_string()))?;

            sqlx::query("UPDATE bookings SET status = 'fulfilled' WHERE id = $1")
                .bind(booking_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| TxError::Store(map_sqlx_error("fulfill_booking", e)))?;
        }

        let row = sqlx::query(
            r#"
            INSERT INTO contracts (
                id, company_id, client_id, vehicle_id, manager_id,
                starts_on, ends_on, total_amount, deposit_amount, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', $10)
            RETURNING id, company_id, client_id, vehicle_id, manager_id, starts_on, ends_on,
                      total_amount, deposit_amount, status, created_at, closed_at
            "#,
        )
        .bind(draft.id.as_uuid())
        .bind(draft.company_id.as_uuid())
        .bind(draft.client_id.as_uuid())
        .bind(draft.vehicle_id.as_uuid())
        .bind(draft.manager_id.as_uuid())
        .bind(draft.period.starts_on)
        .bind(draft.period.ends_on)
        .bind(draft.total_amount as i64)
        .bind(draft.deposit_amount as i64)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TxError::Store(map_sqlx_error("insert_contract", e)))?;

        let contract = contract_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("commit", e)))?;

        Ok(contract)
    }

    #[instrument(skip(self), fields(contract_id = %id), err)]
    async fn commit_contract_close(&self, id: ContractId) -> Result<Contract, TxError> {
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("begin", e)))?;

        let row = sqlx::query(
            r#"
            SELECT id, company_id, client_id, vehicle_id, manager_id, starts_on, ends_on,
                   total_amount, deposit_amount, status, created_at, closed_at
            FROM contracts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TxError::Store(map_sqlx_error("load_contract", e)))?;

        let contract = row
            .as_ref()
            .map(contract_from_row)
            .transpose()?
            .ok_or(TxError::NotFound)?;

        if contract.status.is_terminal() {
            return Err(TxError::AlreadyClosed {
                status: contract.status,
            });
        }

        sqlx::query(
            "UPDATE contracts SET status = 'completed', closed_at = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| TxError::Store(map_sqlx_error("close_contract", e)))?;

        if let Some(vehicle) = vehicle_in_tx(&mut tx, contract.vehicle_id).await? {
            // Closing always frees the vehicle.
            let freed = vehicle.end_rental().unwrap_or(VehicleStatus::Available);
            sqlx::query(
                "UPDATE company_cars SET status = $2, updated_at = $3 WHERE id = $1",
            )
            .bind(contract.vehicle_id.as_uuid())
            .bind(freed.as_str())
            .bind(vehicle.version.bumped(now).as_timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("free_vehicle", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| TxError::Store(map_sqlx_error("commit", e)))?;

        Ok(Contract {
            status: ContractStatus::Completed,
            closed_at: Some(now),
            ..contract
        })
    }
}

#[async_trait]
impl AuditLogStore for PostgresStore {
    #[instrument(skip(self, record), fields(entity = record.entity.as_str()), err)]
    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_id, role, company_id, entity_type, entity_id,
                action, before_state, after_state, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING id, actor_id, role, company_id, entity_type, entity_id,
                      action, before_state, after_state, created_at
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(record.actor_id.as_uuid())
        .bind(record.role.as_str())
        .bind(record.company_id.map(|c| *c.as_uuid()))
        .bind(record.entity.as_str())
        .bind(record.entity_id)
        .bind(record.action.as_str())
        .bind(&record.before_state)
        .bind(&record.after_state)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;

        audit_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_audit(
        &self,
        company_id: Option<CompanyId>,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, role, company_id, entity_type, entity_id,
                   action, before_state, after_state, created_at
            FROM audit_logs
            WHERE $1::uuid IS NULL OR company_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(company_id.map(|c| *c.as_uuid()))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit", e))?;

        rows.iter().map(audit_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn clear_audit(&self, company_id: Option<CompanyId>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM audit_logs WHERE $1::uuid IS NULL OR company_id = $1",
        )
        .bind(company_id.map(|c| *c.as_uuid()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("clear_audit", e))?;

        Ok(result.rows_affected())
    }
}
