use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, Order, QueryOrder};
use vigil_common::types::Org;

use super::{not_found, now, Store};
use crate::entities::org::{self, Column, Entity};
use crate::error::{Result, StorageError};

fn to_org(m: org::Model) -> Org {
    Org {
        id: m.id,
        name: m.name,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl Store {
    pub async fn create_org(&self, org: &Org) -> Result<Org> {
        let id = if org.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            org.id.clone()
        };
        let now = now();
        let am = org::ActiveModel {
            id: Set(id.clone()),
            name: Set(org.name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am
            .insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("org", &id, e))?;
        Ok(to_org(model))
    }

    pub async fn read_org(&self, id: &str) -> Result<Org> {
        Entity::find_by_id(id)
            .one(self.db())
            .await?
            .map(to_org)
            .ok_or_else(|| not_found("org", id))
    }

    pub async fn list_orgs(&self) -> Result<Vec<Org>> {
        let rows = Entity::find()
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_org).collect())
    }
}
