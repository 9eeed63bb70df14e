//! Transactional workflow engine for the contract lifecycle.
//!
//! The two flows that straddle vehicle availability, contract rows and
//! payment rows run here: contract creation and contract close. Each has a
//! single atomic unit (behind the `RentalStore` port) followed by best-effort
//! post-commit steps. The split is structural: what must not fail lives in
//! the atomic unit, what may degrade lives in the post-commit hook list and
//! surfaces as warnings, never as errors.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use fleetdesk_audit::{AuditAction, AuditEntity, AuditRecorder, NewAuditRecord};
use fleetdesk_auth::{check, AccessContext, GateError, Role};
use fleetdesk_core::{BookingId, ContractId, UserId, VehicleId, VersionToken};
use fleetdesk_rental::{
    Contract, ContractStatus, PaymentKind, RentalPeriod, Vehicle, VehicleStatus,
};

use crate::store::{ContractDraft, NewPayment, RentalStore, StoreError, TxError};

/// Roles allowed to run contract workflows.
const CONTRACT_ROLES: &[Role] = &[Role::Owner, Role::Manager, Role::Admin];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Role or company-scope check failed. Opaque on purpose.
    #[error("access denied")]
    Forbidden,

    /// Someone else modified the vehicle since it was read; retry with fresh
    /// data.
    #[error("vehicle was modified concurrently")]
    Conflict {
        expected: VersionToken,
        found: VersionToken,
    },

    /// The vehicle is no longer available; pick another.
    #[error("vehicle is not available (status: {status:?})")]
    VehicleUnavailable { status: VehicleStatus },

    /// The contract is already completed or cancelled.
    #[error("contract is already {status:?}")]
    ContractClosed { status: ContractStatus },

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<GateError> for WorkflowError {
    fn from(_: GateError) -> Self {
        WorkflowError::Forbidden
    }
}

impl From<TxError> for WorkflowError {
    fn from(value: TxError) -> Self {
        match value {
            TxError::VersionConflict { expected, found } => {
                WorkflowError::Conflict { expected, found }
            }
            TxError::VehicleUnavailable { status } => {
                WorkflowError::VehicleUnavailable { status }
            }
            TxError::AlreadyClosed { status } => WorkflowError::ContractClosed { status },
            TxError::BookingRejected(msg) => WorkflowError::Validation(msg),
            // Cross-company rows inside the atomic unit mean the caller's
            // scope check was bypassed somewhere; refuse opaquely.
            TxError::CompanyIsolation(_) => WorkflowError::Forbidden,
            TxError::NotFound => WorkflowError::NotFound,
            TxError::Store(e) => WorkflowError::Store(e),
        }
    }
}

/// Input to the create-contract flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContractInput {
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    pub period: RentalPeriod,
    /// Total rental fee in the smallest currency unit.
    pub total_amount: u64,
    /// Deposit in the smallest currency unit.
    pub deposit_amount: u64,
    pub booking_id: Option<BookingId>,
    /// Version token the caller read earlier. When absent the engine uses the
    /// token it reads immediately before the atomic unit: a narrower but
    /// still race-prone window, accepted as the fallback.
    pub vehicle_version: Option<VersionToken>,
}

/// A desk-submitted closing fee; the label classifies to a payment kind or
/// falls back to `other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingFee {
    pub label: String,
    pub amount: u64,
}

/// A post-commit step that degraded. The business fact stands regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostCommitWarning {
    pub step: &'static str,
    pub detail: String,
}

/// A committed result plus any post-commit warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed<T> {
    pub value: T,
    pub warnings: Vec<PostCommitWarning>,
}

/// Collects best-effort steps run after the atomic unit commits.
///
/// Each failed step is logged on the operational channel and recorded as a
/// warning; none of them can undo the committed business fact.
struct PostCommit {
    warnings: Vec<PostCommitWarning>,
}

impl PostCommit {
    fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    async fn run<T, E>(
        &mut self,
        step: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Option<T>
    where
        E: core::fmt::Display,
    {
        match fut.await {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(step, error = %err, "post-commit step degraded");
                self.warnings.push(PostCommitWarning {
                    step,
                    detail: err.to_string(),
                });
                None
            }
        }
    }

    /// The audit recorder swallows its own errors; it reports loss as a flag.
    fn note_audit(&mut self, appended: bool) {
        if !appended {
            self.warnings.push(PostCommitWarning {
                step: "audit",
                detail: "audit record lost".to_string(),
            });
        }
    }
}

/// The transactional workflow engine.
#[derive(Clone)]
pub struct RentalWorkflows {
    rentals: Arc<dyn RentalStore>,
    audit: AuditRecorder,
}

impl RentalWorkflows {
    pub fn new(rentals: Arc<dyn RentalStore>, audit: AuditRecorder) -> Self {
        Self { rentals, audit }
    }

    async fn load_vehicle_checked(
        &self,
        ctx: &AccessContext,
        id: VehicleId,
    ) -> Result<Vehicle, WorkflowError> {
        let vehicle = self
            .rentals
            .find_vehicle(id)
            .await
            .map_err(WorkflowError::Store)?
            .ok_or(WorkflowError::NotFound)?;

        // Second gate pass, now with the concrete target company.
        check(ctx, CONTRACT_ROLES, Some(vehicle.company_id))?;
        Ok(vehicle)
    }

    /// Create a contract from a booking (or directly), atomically flipping
    /// the vehicle to rented under its optimistic lock.
    #[instrument(
        skip(self, ctx, input),
        fields(
            actor = %ctx.principal.id,
            vehicle_id = %input.vehicle_id,
        ),
        err
    )]
    pub async fn create_contract(
        &self,
        ctx: &AccessContext,
        input: CreateContractInput,
    ) -> Result<Completed<Contract>, WorkflowError> {
        check(ctx, CONTRACT_ROLES, None)?;

        let vehicle = self.load_vehicle_checked(ctx, input.vehicle_id).await?;

        if let Some(booking_id) = input.booking_id {
            let booking = self
                .rentals
                .find_booking(booking_id)
                .await
                .map_err(WorkflowError::Store)?
                .ok_or_else(|| WorkflowError::Validation("booking not found".to_string()))?;

            if booking.company_id != vehicle.company_id {
                return Err(WorkflowError::Forbidden);
            }
            if booking.vehicle_id != input.vehicle_id {
                return Err(WorkflowError::Validation(
                    "booking is for a different vehicle".to_string(),
                ));
            }
            booking
                .ensure_fulfillable()
                .map_err(|e| WorkflowError::Validation(e.to_string()))?;
        }

        // Fallback: without a caller-supplied token, use the one just read.
        let expected = input.vehicle_version.unwrap_or(vehicle.version);

        let draft = ContractDraft {
            id: ContractId::new(),
            company_id: vehicle.company_id,
            client_id: input.client_id,
            vehicle_id: input.vehicle_id,
            manager_id: ctx.principal.id,
            period: input.period,
            total_amount: input.total_amount,
            deposit_amount: input.deposit_amount,
            booking_id: input.booking_id,
        };

        let contract = self.rentals.commit_contract(draft, expected).await?;

        // The contract is the durable business fact; everything below may
        // degrade to warnings.
        let mut post = PostCommit::new();

        post.run(
            "payment:rental",
            self.rentals.insert_payment(NewPayment {
                company_id: contract.company_id,
                contract_id: contract.id,
                kind: PaymentKind::Rental,
                label: None,
                amount: contract.total_amount,
            }),
        )
        .await;

        post.run(
            "payment:deposit",
            self.rentals.insert_payment(NewPayment {
                company_id: contract.company_id,
                contract_id: contract.id,
                kind: PaymentKind::Deposit,
                label: None,
                amount: contract.deposit_amount,
            }),
        )
        .await;

        let appended = self
            .audit
            .record(NewAuditRecord {
                actor_id: ctx.principal.id,
                // The real role: an impersonating admin stays `admin` here.
                role: ctx.scope.role,
                company_id: Some(contract.company_id),
                entity: AuditEntity::Contract,
                entity_id: *contract.id.as_uuid(),
                action: AuditAction::Create,
                before_state: None,
                after_state: serde_json::to_value(&contract).ok(),
            })
            .await;
        post.note_audit(appended);

        Ok(Completed {
            value: contract,
            warnings: post.warnings,
        })
    }

    /// Close a contract: complete it and free the vehicle, then record the
    /// submitted closing fees as pending payments.
    #[instrument(
        skip(self, ctx, fees),
        fields(actor = %ctx.principal.id, contract_id = %contract_id),
        err
    )]
    pub async fn close_contract(
        &self,
        ctx: &AccessContext,
        contract_id: ContractId,
        fees: Vec<ClosingFee>,
    ) -> Result<Completed<Contract>, WorkflowError> {
        check(ctx, CONTRACT_ROLES, None)?;

        let contract = self
            .rentals
            .find_contract(contract_id)
            .await
            .map_err(WorkflowError::Store)?
            .ok_or(WorkflowError::NotFound)?;

        check(ctx, CONTRACT_ROLES, Some(contract.company_id))?;

        contract.ensure_closable().map_err(|_| WorkflowError::ContractClosed {
            status: contract.status,
        })?;

        let before = serde_json::to_value(&contract).ok();
        let closed = self.rentals.commit_contract_close(contract_id).await?;

        let mut post = PostCommit::new();

        // Fee insertion is not atomic with the status flip; a failed row is
        // logged and the contract stays closed.
        for fee in &fees {
            post.run(
                "payment:closing_fee",
                self.rentals.insert_payment(NewPayment {
                    company_id: closed.company_id,
                    contract_id: closed.id,
                    kind: PaymentKind::classify(&fee.label),
                    label: Some(fee.label.clone()),
                    amount: fee.amount,
                }),
            )
            .await;
        }

        let appended = self
            .audit
            .record(NewAuditRecord {
                actor_id: ctx.principal.id,
                role: ctx.scope.role,
                company_id: Some(closed.company_id),
                entity: AuditEntity::Contract,
                entity_id: *closed.id.as_uuid(),
                action: AuditAction::Update,
                before_state: before,
                after_state: serde_json::to_value(&closed).ok(),
            })
            .await;
        post.note_audit(appended);

        Ok(Completed {
            value: closed,
            warnings: post.warnings,
        })
    }
}

impl core::fmt::Debug for RentalWorkflows {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RentalWorkflows").finish_non_exhaustive()
    }
}
