//! Tenant-scoped persistence for the vigil pipeline.
//!
//! [`Store`] wraps a SeaORM connection and owns the schema (created through
//! the `migration` crate). Every lookup except the Validator's
//! device-by-unique-id resolution takes an org id; nothing here can return
//! another tenant's rows.
//!
//! Pipeline stages depend only on the narrower [`PipelineStore`] trait so
//! they can be exercised against any backend.

pub mod entities;
pub mod error;
pub mod store;


use async_trait::async_trait;
use vigil_common::types::{Alarm, Alert, Device, Event, Org, Rule, User};

pub use error::{Result, StorageError};
pub use store::{AlertFilter, Cursor, EventFilter, Page, Store};

/// Read and append operations the pipeline stages need.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Resolves a device by its external identifier, case-insensitively.
    async fn read_device_by_unique_id(&self, unique_id: &str) -> Result<Device>;

    /// Active rules in `org_id` on `attr` whose device tag is in `tags`.
    async fn list_active_rules_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>>;

    async fn read_org(&self, org_id: &str) -> Result<Org>;

    /// All alarms attached to a rule, regardless of status.
    async fn list_alarms_by_rule(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>>;

    /// Active users in `org_id` sharing at least one of `tags`.
    async fn list_users_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>>;

    async fn create_event(&self, event: &Event) -> Result<()>;

    async fn create_alert(&self, alert: &Alert) -> Result<()>;
}

#[async_trait]
impl PipelineStore for Store {
    async fn read_device_by_unique_id(&self, unique_id: &str) -> Result<Device> {
        Store::read_device_by_unique_id(self, unique_id).await
    }

    async fn list_active_rules_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>> {
        Store::list_active_rules_by_tags(self, org_id, attr, tags).await
    }

    async fn read_org(&self, org_id: &str) -> Result<Org> {
        Store::read_org(self, org_id).await
    }

    async fn list_alarms_by_rule(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>> {
        Store::list_alarms_by_rule(self, org_id, rule_id).await
    }

    async fn list_users_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>> {
        Store::list_users_by_tags(self, org_id, tags).await
    }

    async fn create_event(&self, event: &Event) -> Result<()> {
        Store::create_event(self, event).await
    }

    async fn create_alert(&self, alert: &Alert) -> Result<()> {
        Store::create_alert(self, alert).await
    }
}
