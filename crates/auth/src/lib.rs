//! `fleetdesk-auth` — pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage. Resolving a
//! session token against the store and loading the principal's fresh role
//! happens in `fleetdesk-infra`; everything here is deterministic policy.

pub mod gate;
pub mod impersonation;
pub mod principal;
pub mod role;
pub mod scope;
pub mod session;

pub use gate::{check, AccessContext, GateError};
pub use impersonation::{AdminModeRequest, ImpersonationMarker};
pub use principal::Principal;
pub use role::Role;
pub use scope::Scope;
pub use session::{Session, SessionToken, SessionValidationError};
