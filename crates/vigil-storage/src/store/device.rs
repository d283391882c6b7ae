use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use vigil_common::types::{normalize_unique_id, Device, Status};

use super::{encode_tags, not_found, now, parse_status, parse_tags, Store};
use crate::entities::device::{self, Column, Entity};
use crate::error::{Result, StorageError};

fn to_device(m: device::Model) -> Result<Device> {
    Ok(Device {
        status: parse_status("devices.status", &m.status)?,
        tags: parse_tags(&m.tags)?,
        id: m.id,
        org_id: m.org_id,
        unique_id: m.unique_id,
        name: m.name,
        token: m.token,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl Store {
    /// Inserts a device. An empty `id` is replaced with a generated one and
    /// `unique_id` is stored lower-cased.
    pub async fn create_device(&self, device: &Device) -> Result<Device> {
        let id = if device.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            device.id.clone()
        };
        let unique_id = normalize_unique_id(&device.unique_id);
        let now = now();
        let am = device::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(device.org_id.clone()),
            unique_id: Set(unique_id.clone()),
            name: Set(device.name.clone()),
            status: Set(device.status.to_string()),
            token: Set(device.token.clone()),
            tags: Set(encode_tags(&device.tags)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am
            .insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("device", &unique_id, e))?;
        to_device(model)
    }

    /// Looks up a device by its external identifier across all orgs. The
    /// identifier is matched case-insensitively.
    pub async fn read_device_by_unique_id(&self, unique_id: &str) -> Result<Device> {
        let unique_id = normalize_unique_id(unique_id);
        let model = Entity::find()
            .filter(Column::UniqueId.eq(unique_id.as_str()))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("device", &unique_id))?;
        to_device(model)
    }

    pub async fn read_device(&self, org_id: &str, id: &str) -> Result<Device> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("device", id))?;
        to_device(model)
    }

    pub async fn list_devices(&self, org_id: &str) -> Result<Vec<Device>> {
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_device)
            .collect()
    }

    pub async fn set_device_status(&self, org_id: &str, id: &str, status: Status) -> Result<Device> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("device", id))?;
        let mut active: device::ActiveModel = model.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(now());
        to_device(active.update(self.db()).await?)
    }
}
