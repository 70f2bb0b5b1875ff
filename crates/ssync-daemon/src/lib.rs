//! HTTP surface for the sync engine. `main.rs` wires config, tracing, and
//! shutdown; route handlers live in `routes.rs`, shared state in `state.rs`.

pub mod api_types;
pub mod routes;
pub mod state;
