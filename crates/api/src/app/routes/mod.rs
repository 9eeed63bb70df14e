use axum::Router;

pub mod admin_mode;
pub mod audit;
pub mod bookings;
pub mod common;
pub mod contracts;
pub mod payments;
pub mod system;
pub mod vehicles;

/// All protected routes (auth middleware applied by the caller).
pub fn router() -> Router {
    Router::new()
        .merge(system::protected_router())
        .merge(admin_mode::router())
        .merge(vehicles::router())
        .merge(bookings::router())
        .merge(contracts::router())
        .merge(payments::router())
        .merge(audit::router())
}
