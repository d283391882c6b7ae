//! Shared types for the vigil telemetry pipeline.
//!
//! [`types`] holds the tenant-scoped domain entities as they are persisted
//! and administered; [`proto`] holds the schema-encoded messages that travel
//! between the Validator, Eventer and Alerter stages over the broker.

pub mod id;
pub mod proto;
pub mod trace;
pub mod types;
