use chrono::{DateTime, FixedOffset, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use std::path::Path;
use vigil_common::types::Status;

use crate::error::{Result, StorageError};

pub mod alarm;
pub mod device;
pub mod history;
pub mod org;
pub mod rule;
pub mod user;

pub use history::{AlertFilter, Cursor, EventFilter, Page};

/// SeaORM-backed store for every tenant-scoped entity.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: DatabaseConnection,
}

impl Store {
    /// Connects to the database and brings the schema up to date.
    ///
    /// - `db_url`: full connection URL, e.g. `sqlite:///var/lib/vigil/vigil.db?mode=rwc`.
    /// - `data_dir`: local directory that must exist before SQLite can create
    ///   its file in it.
    pub async fn new(db_url: &str, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::connect(db_url).await?;

        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA busy_timeout=5000;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!(db_url = %db_url, "Initialized store");

        Ok(Self { db })
    }

    /// Opens a SQLite database file named `vigil.db` inside `data_dir`.
    pub async fn open_sqlite(data_dir: &Path) -> Result<Self> {
        let url = format!("sqlite://{}/vigil.db?mode=rwc", data_dir.display());
        Self::new(&url, data_dir).await
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

pub(crate) fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

pub(crate) fn parse_status(column: &'static str, value: &str) -> Result<Status> {
    value.parse().map_err(|_| StorageError::InvalidColumn {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn parse_tags(value: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(value)?)
}

pub(crate) fn encode_tags(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

pub(crate) fn not_found(entity: &'static str, id: &str) -> StorageError {
    StorageError::NotFound {
        entity,
        id: id.to_string(),
    }
}
