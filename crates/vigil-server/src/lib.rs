//! The vigil service binary's library half: configuration, the admin HTTP
//! surface and the seed loader. `main.rs` wires these to the pipeline.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod logging;
pub mod seed;
pub mod state;
