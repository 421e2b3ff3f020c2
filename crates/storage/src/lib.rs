use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{domain::ItemId, protocol::Item};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

/// Entries written by [`Storage::reseed`].
pub const SEED_ITEMS: &[&str] = &["Buy milk", "Walk the dog", "Write the weekly report"];

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItem {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl StoredItem {
    pub fn into_item(self) -> Item {
        Item {
            id: ItemId::from(self.id),
            text: self.text,
            created_at: self.created_at,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Storage {
    /// Opens (creating if needed) the database and applies migrations.
    ///
    /// Safe to call repeatedly against the same database; the application
    /// shell calls it once at startup.
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every connection to an in-memory database is a separate database
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply item migrations")?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_items(&self) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query("SELECT id, text, created_at FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(StoredItem::from_row).collect()
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<StoredItem>> {
        let row = sqlx::query("SELECT id, text, created_at FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(StoredItem::from_row).transpose()
    }

    pub async fn create_item(&self, text: &str, created_at: DateTime<Utc>) -> Result<StoredItem> {
        let row = sqlx::query(
            "INSERT INTO items (text, created_at) VALUES (?, ?)
             RETURNING id, text, created_at",
        )
        .bind(text)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        StoredItem::from_row(&row)
    }

    /// Returns `None` when no item has the given id.
    pub async fn update_item(&self, id: i64, text: &str) -> Result<Option<StoredItem>> {
        let row = sqlx::query(
            "UPDATE items SET text = ? WHERE id = ?
             RETURNING id, text, created_at",
        )
        .bind(text)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(StoredItem::from_row).transpose()
    }

    /// Returns whether a row was removed.
    pub async fn delete_item(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every item and restarts identifier assignment.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        clear_items(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the whole store with [`SEED_ITEMS`]; ids restart at 1.
    pub async fn reseed(&self) -> Result<Vec<StoredItem>> {
        let mut tx = self.pool.begin().await?;
        clear_items(&mut tx).await?;

        let now = Utc::now();
        let mut seeded = Vec::with_capacity(SEED_ITEMS.len());
        for text in SEED_ITEMS {
            let row = sqlx::query(
                "INSERT INTO items (text, created_at) VALUES (?, ?)
                 RETURNING id, text, created_at",
            )
            .bind(*text)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .context("failed to insert seed item")?;
            seeded.push(StoredItem::from_row(&row)?);
        }

        tx.commit().await?;
        info!(count = seeded.len(), "storage: reseeded items");
        Ok(seeded)
    }
}

async fn clear_items(tx: &mut sqlx::Transaction<'_, Sqlite>) -> Result<()> {
    sqlx::query("DELETE FROM items")
        .execute(&mut **tx)
        .await
        .context("failed to clear items")?;
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'items'")
        .execute(&mut **tx)
        .await
        .context("failed to reset item id sequence")?;
    Ok(())
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
