use chrono::{TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect,
};
use vigil_common::types::{Alert, AlertStatus, Event};

use super::Store;
use crate::entities::{alert, event};
use crate::error::{Result, StorageError};

/// Position after the last row of a page: rows are ordered by
/// `(created_at_ms, id)` descending, so the next page starts strictly below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at_ms: i64,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

/// Window and filters for listing events. `start_ms` is exclusive,
/// `end_ms` inclusive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub org_id: String,
    pub unique_id: Option<String>,
    pub rule_id: Option<String>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub limit: u64,
    pub cursor: Option<Cursor>,
}

/// Window and filters for listing alerts. `start_ms` is exclusive,
/// `end_ms` inclusive.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub org_id: String,
    pub unique_id: Option<String>,
    pub alarm_id: Option<String>,
    pub user_id: Option<String>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub limit: u64,
    pub cursor: Option<Cursor>,
}

fn to_event(m: event::Model) -> Event {
    Event {
        id: m.id,
        org_id: m.org_id,
        unique_id: m.unique_id,
        rule_id: m.rule_id,
        created_at: from_millis(m.created_at_ms),
        trace_id: m.trace_id,
    }
}

fn to_alert(m: alert::Model) -> Result<Alert> {
    let status: AlertStatus = m.status.parse().map_err(|_| StorageError::InvalidColumn {
        column: "alerts.status",
        value: m.status.clone(),
    })?;
    Ok(Alert {
        status,
        id: m.id,
        org_id: m.org_id,
        unique_id: m.unique_id,
        alarm_id: m.alarm_id,
        user_id: m.user_id,
        error: m.error,
        created_at: from_millis(m.created_at_ms),
        trace_id: m.trace_id,
    })
}

fn from_millis(ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// `(ts, id) < (cursor.ts, cursor.id)` in descending page order.
fn before_cursor<C: ColumnTrait>(ts: C, id: C, cursor: &Cursor) -> Condition {
    Condition::any().add(ts.lt(cursor.created_at_ms)).add(
        Condition::all()
            .add(ts.eq(cursor.created_at_ms))
            .add(id.lt(cursor.id.as_str())),
    )
}

fn into_page<M, T>(
    mut rows: Vec<M>,
    limit: u64,
    convert: impl Fn(M) -> Result<T>,
    key: impl Fn(&T) -> Cursor,
) -> Result<Page<T>> {
    let has_more = rows.len() as u64 > limit;
    rows.truncate(limit as usize);
    let items = rows.into_iter().map(convert).collect::<Result<Vec<_>>>()?;
    let next = if has_more { items.last().map(key) } else { None };
    Ok(Page { items, next })
}

impl Store {
    /// Appends an event row. Events are never updated.
    pub async fn create_event(&self, ev: &Event) -> Result<()> {
        let id = if ev.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            ev.id.clone()
        };
        let am = event::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(ev.org_id.clone()),
            unique_id: Set(ev.unique_id.clone()),
            rule_id: Set(ev.rule_id.clone()),
            created_at_ms: Set(ev.created_at.timestamp_millis()),
            trace_id: Set(ev.trace_id.clone()),
        };
        am.insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("event", &id, e))?;
        Ok(())
    }

    /// Appends an alert row. Alerts are never updated.
    pub async fn create_alert(&self, al: &Alert) -> Result<()> {
        let id = if al.id.is_empty() {
            vigil_common::id::next_id()
        } else {
            al.id.clone()
        };
        let am = alert::ActiveModel {
            id: Set(id.clone()),
            org_id: Set(al.org_id.clone()),
            unique_id: Set(al.unique_id.clone()),
            alarm_id: Set(al.alarm_id.clone()),
            user_id: Set(al.user_id.clone()),
            status: Set(al.status.to_string()),
            error: Set(al.error.clone()),
            created_at_ms: Set(al.created_at.timestamp_millis()),
            trace_id: Set(al.trace_id.clone()),
        };
        am.insert(self.db())
            .await
            .map_err(|e| StorageError::from_insert("alert", &id, e))?;
        Ok(())
    }

    /// Newest-first page of events in the filter's window.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Page<Event>> {
        use event::Column;

        let mut q = event::Entity::find()
            .filter(Column::OrgId.eq(filter.org_id.as_str()))
            .filter(Column::CreatedAtMs.gt(filter.start_ms))
            .filter(Column::CreatedAtMs.lte(filter.end_ms));
        if let Some(unique_id) = &filter.unique_id {
            q = q.filter(Column::UniqueId.eq(unique_id.as_str()));
        }
        if let Some(rule_id) = &filter.rule_id {
            q = q.filter(Column::RuleId.eq(rule_id.as_str()));
        }
        if let Some(cursor) = &filter.cursor {
            q = q.filter(before_cursor(Column::CreatedAtMs, Column::Id, cursor));
        }
        let rows = q
            .order_by(Column::CreatedAtMs, Order::Desc)
            .order_by(Column::Id, Order::Desc)
            .limit(filter.limit + 1)
            .all(self.db())
            .await?;

        into_page(
            rows,
            filter.limit,
            |m| Ok(to_event(m)),
            |e: &Event| Cursor {
                created_at_ms: e.created_at.timestamp_millis(),
                id: e.id.clone(),
            },
        )
    }

    /// Newest-first page of alerts in the filter's window.
    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Page<Alert>> {
        use alert::Column;

        let mut q = alert::Entity::find()
            .filter(Column::OrgId.eq(filter.org_id.as_str()))
            .filter(Column::CreatedAtMs.gt(filter.start_ms))
            .filter(Column::CreatedAtMs.lte(filter.end_ms));
        if let Some(unique_id) = &filter.unique_id {
            q = q.filter(Column::UniqueId.eq(unique_id.as_str()));
        }
        if let Some(alarm_id) = &filter.alarm_id {
            q = q.filter(Column::AlarmId.eq(alarm_id.as_str()));
        }
        if let Some(user_id) = &filter.user_id {
            q = q.filter(Column::UserId.eq(user_id.as_str()));
        }
        if let Some(cursor) = &filter.cursor {
            q = q.filter(before_cursor(Column::CreatedAtMs, Column::Id, cursor));
        }
        let rows = q
            .order_by(Column::CreatedAtMs, Order::Desc)
            .order_by(Column::Id, Order::Desc)
            .limit(filter.limit + 1)
            .all(self.db())
            .await?;

        into_page(rows, filter.limit, to_alert, |a: &Alert| Cursor {
            created_at_ms: a.created_at.timestamp_millis(),
            id: a.id.clone(),
        })
    }
}
