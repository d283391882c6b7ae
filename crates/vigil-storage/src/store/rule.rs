use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use vigil_common::types::{Rule, Status};

use super::{not_found, now, parse_status, Store};
use crate::entities::rule::{self, Column, Entity};
use crate::error::{Result, StorageError};

fn to_rule(m: rule::Model) -> Result<Rule> {
    Ok(Rule {
        status: parse_status("rules.status", &m.status)?,
        id: m.id,
        org_id: m.org_id,
        name: m.name,
        device_tag: m.device_tag,
        attr: m.attr,
        expr: m.expr,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl Store {
    pub async fn create_rule(&self, rule: &Rule) -> Result<Rule> {
        let id = if rule.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            rule.id.clone()
        };
        let now = now();
        let am = rule::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(rule.org_id.clone()),
            name: Set(rule.name.clone()),
            status: Set(rule.status.to_string()),
            device_tag: Set(rule.device_tag.clone()),
            attr: Set(rule.attr.clone()),
            expr: Set(rule.expr.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am
            .insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("rule", &id, e))?;
        to_rule(model)
    }

    pub async fn read_rule(&self, org_id: &str, id: &str) -> Result<Rule> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("rule", id))?;
        to_rule(model)
    }

    pub async fn list_rules(&self, org_id: &str) -> Result<Vec<Rule>> {
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_rule)
            .collect()
    }

    /// Active rules in `org_id` on attribute `attr` whose device tag is one
    /// of `tags`.
    pub async fn list_active_rules_by_tags(
        &self,
        org_id: &str,
        attr: &str,
        tags: &[String],
    ) -> Result<Vec<Rule>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .filter(Column::Attr.eq(attr))
            .filter(Column::Status.eq(Status::Active.to_string()))
            .filter(Column::DeviceTag.is_in(tags.iter().cloned()))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_rule)
            .collect()
    }

    pub async fn set_rule_status(&self, org_id: &str, id: &str, status: Status) -> Result<Rule> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("rule", id))?;
        let mut active: rule::ActiveModel = model.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(now());
        to_rule(active.update(self.db()).await?)
    }
}
