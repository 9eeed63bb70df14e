//! `fleetdesk-api` — HTTP boundary (Axum).
//!
//! Thin by design: routes validate input, run the permission gate, call the
//! workflow engine or a gated store read, and map results to JSON. No route
//! re-implements role comparisons or touches the store before the gate.

pub mod app;
pub mod context;
pub mod middleware;
