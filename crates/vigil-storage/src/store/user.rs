use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use vigil_common::types::{Status, User};

use super::{encode_tags, not_found, now, parse_status, parse_tags, Store};
use crate::entities::user::{self, Column, Entity};
use crate::error::{Result, StorageError};

fn to_user(m: user::Model) -> Result<User> {
    Ok(User {
        status: parse_status("users.status", &m.status)?,
        tags: parse_tags(&m.tags)?,
        id: m.id,
        org_id: m.org_id,
        name: m.name,
        email: m.email,
        phone: m.phone,
        app_key: m.app_key,
        role: m.role,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl Store {
    pub async fn create_user(&self, user: &User) -> Result<User> {
        let id = if user.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            user.id.clone()
        };
        let now = now();
        let am = user::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(user.org_id.clone()),
            name: Set(user.name.clone()),
            email: Set(user.email.clone()),
            phone: Set(user.phone.clone()),
            app_key: Set(user.app_key.clone()),
            role: Set(user.role.clone()),
            status: Set(user.status.to_string()),
            tags: Set(encode_tags(&user.tags)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am
            .insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("user", &id, e))?;
        to_user(model)
    }

    pub async fn read_user(&self, org_id: &str, id: &str) -> Result<User> {
        let model = Entity::find_by_id(id)
            .filter(Column::OrgId.eq(org_id))
            .one(self.db())
            .await?
            .ok_or_else(|| not_found("user", id))?;
        to_user(model)
    }

    pub async fn list_users(&self, org_id: &str) -> Result<Vec<User>> {
        Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_user)
            .collect()
    }

    /// Active users in `org_id` carrying at least one of `tags`.
    ///
    /// Tags live in a JSON column, so the intersection is computed after the
    /// org-scoped query.
    pub async fn list_users_by_tags(&self, org_id: &str, tags: &[String]) -> Result<Vec<User>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let rows = Entity::find()
            .filter(Column::OrgId.eq(org_id))
            .filter(Column::Status.eq(Status::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        let mut users = Vec::new();
        for m in rows {
            let user = to_user(m)?;
            if user.shares_tag(tags) {
                users.push(user);
            }
        }
        Ok(users)
    }
}
