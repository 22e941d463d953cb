use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::FilterRecordId;

mod seed;

pub use seed::{default_filters, SyncReport};

const FILTER_COLUMNS: &str = "id, name, display_name, description, background_image, icon, \
     is_active, sort_order, usage_count, last_used_at, created_at, updated_at";

pub const MAX_FILTER_NAME_CHARS: usize = 50;
pub const MAX_DISPLAY_NAME_CHARS: usize = 100;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredFilter {
    pub id: FilterRecordId,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub background_image: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub sort_order: i64,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFilter {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub background_image: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct StoredFilterUsage {
    pub name: String,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Catalog names are stored and looked up lowercase.
pub fn normalize_filter_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every pooled connection to `sqlite::memory:` opens its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_filter(&self, filter: &NewFilter) -> Result<StoredFilter> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO filters
                (name, display_name, description, background_image, icon, is_active, sort_order,
                 usage_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             RETURNING {FILTER_COLUMNS}"
        ))
        .bind(normalize_filter_name(&filter.name))
        .bind(&filter.display_name)
        .bind(&filter.description)
        .bind(&filter.background_image)
        .bind(&filter.icon)
        .bind(filter.is_active)
        .bind(filter.sort_order)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert filter '{}'", filter.name))?;
        filter_from_row(&row)
    }

    /// Updates the descriptive columns of an existing filter, leaving usage untouched.
    pub async fn update_filter_details(&self, filter: &NewFilter) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE filters
             SET display_name = ?, description = ?, background_image = ?, icon = ?,
                 is_active = ?, sort_order = ?, updated_at = ?
             WHERE name = ?",
        )
        .bind(&filter.display_name)
        .bind(&filter.description)
        .bind(&filter.background_image)
        .bind(&filter.icon)
        .bind(filter.is_active)
        .bind(filter.sort_order)
        .bind(Utc::now())
        .bind(normalize_filter_name(&filter.name))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<StoredFilter>> {
        let row = sqlx::query(&format!("SELECT {FILTER_COLUMNS} FROM filters WHERE name = ?"))
            .bind(normalize_filter_name(name))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(filter_from_row).transpose()
    }

    pub async fn list_active_filters(&self) -> Result<Vec<StoredFilter>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters
             WHERE is_active = 1
             ORDER BY sort_order ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(filter_from_row).collect()
    }

    pub async fn list_all_filters(&self) -> Result<Vec<StoredFilter>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters ORDER BY sort_order ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(filter_from_row).collect()
    }

    pub async fn list_active_filters_by_usage(&self) -> Result<Vec<StoredFilter>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters
             WHERE is_active = 1
             ORDER BY usage_count DESC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(filter_from_row).collect()
    }

    pub async fn most_used_filters(&self, limit: u32) -> Result<Vec<StoredFilter>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters
             WHERE is_active = 1
             ORDER BY usage_count DESC, last_used_at DESC
             LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(filter_from_row).collect()
    }

    /// Bumps the usage counter and stamps `last_used_at`. Returns `None` when
    /// no filter has that name.
    pub async fn increment_usage(&self, name: &str) -> Result<Option<StoredFilterUsage>> {
        let now = Utc::now();
        let row = sqlx::query(
            "UPDATE filters
             SET usage_count = usage_count + 1, last_used_at = ?, updated_at = ?
             WHERE name = ?
             RETURNING name, usage_count, last_used_at",
        )
        .bind(now)
        .bind(now)
        .bind(normalize_filter_name(name))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(StoredFilterUsage {
                name: row.try_get("name")?,
                usage_count: row.try_get("usage_count")?,
                last_used_at: row.try_get("last_used_at")?,
            })
        })
        .transpose()
    }

    pub async fn delete_filter(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM filters WHERE name = ?")
            .bind(normalize_filter_name(name))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_filters(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM filters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn filter_from_row(row: &SqliteRow) -> Result<StoredFilter> {
    Ok(StoredFilter {
        id: FilterRecordId(row.try_get("id")?),
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        background_image: row.try_get("background_image")?,
        icon: row.try_get("icon")?,
        is_active: row.try_get("is_active")?,
        sort_order: row.try_get("sort_order")?,
        usage_count: row.try_get("usage_count")?,
        last_used_at: row.try_get("last_used_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
