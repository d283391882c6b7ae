use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use vigil_common::types::{Alarm, AlarmType, Status};

use super::{encode_tags, not_found, now, parse_status, parse_tags, Store};
use crate::entities::alarm::{self, Column, Entity};
use crate::error::{Result, StorageError};

fn to_alarm(m: alarm::Model) -> Result<Alarm> {
    let alarm_type: AlarmType = m.alarm_type.parse().map_err(|_| StorageError::InvalidColumn {
        column: "alarms.alarm_type",
        value: m.alarm_type.clone(),
    })?;
    Ok(Alarm {
        status: parse_status("alarms.status", &m.status)?,
        user_tags: parse_tags(&m.user_tags)?,
        alarm_type,
        id: m.id,
        org_id: m.org_id,
        rule_id: m.rule_id,
        name: m.name,
        subject_template: m.subject_template,
        body_template: m.body_template,
        repeat_interval_secs: u32::try_from(m.repeat_interval_secs).unwrap_or(0),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl Store {
    pub async fn create_alarm(&self, alarm: &Alarm) -> Result<Alarm> {
        let id = if alarm.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            alarm.id.clone()
        };
        let now = now();
        let am = alarm::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(alarm.org_id.clone()),
            rule_id: Set(alarm.rule_id.clone()),
            name: Set(alarm.name.clone()),
            status: Set(alarm.status.to_string()),
            alarm_type: Set(alarm.alarm_type.to_string()),
            user_tags: Set(encode_tags(&alarm.user_tags)?),
            subject_template: Set(alarm.subject_template.clone()),
            body_template: Set(alarm.body_template.clone()),
            repeat_interval_secs: Set(i32::try_from(alarm.repeat_interval_secs).unwrap_or(i32::MAX)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am
            .insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("alarm", &id, e))?;
        to_alarm(model)
    }

    pub async fn read_alarm(&self, org_id: &str, id: &str) -> Result<Alarm> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("alarm", id))?;
        to_alarm(model)
    }

    pub async fn list_alarms(&self, org_id: &str) -> Result<Vec<Alarm>> {
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_alarm)
            .collect()
    }

    /// Every alarm attached to `rule_id` in `org_id`, whatever its status.
    pub async fn list_alarms_by_rule(&self, org_id: &str, rule_id: &str) -> Result<Vec<Alarm>> {
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .filter(Column::RuleId.eq(rule_id))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_alarm)
            .collect()
    }

    pub async fn set_alarm_status(&self, org_id: &str, id: &str, status: Status) -> Result<Alarm> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("alarm", id))?;
        let mut active: alarm::ActiveModel = model.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(now());
        to_alarm(active.update(self.db()).await?)
    }
}
