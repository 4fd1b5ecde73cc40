//! MetadataStore: SQLite persistence for images, tags and their links.
//!
//! The schema is embedded from `migrations/0001_init.sql` and applied with
//! `CREATE ... IF NOT EXISTS` statements, so running it on every start is
//! harmless.

use crate::models::{
    image::Image,
    tag::{ImageTag, Tag},
};
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::debug;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const IMAGE_COLUMNS: &str =
    "id, object_key, name, size, content_type, uploaded_at, created_at, updated_at";

/// Handle to the relational half of the catalog. Cheap to clone.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool against `database_url`, creating the database file if
    /// needed. `acquire_timeout` bounds how long a query waits for a
    /// connection.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> sqlx::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema one statement at a time.
    pub async fn migrate(&self) -> sqlx::Result<usize> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Health probe: `SELECT 1`.
    pub async fn ping(&self) -> sqlx::Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
            .map(|_| ())
    }

    pub async fn insert_image(&self, image: &Image) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO images (id, object_key, name, size, content_type, uploaded_at,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&image.id)
        .bind(&image.object_key)
        .bind(&image.name)
        .bind(image.size)
        .bind(&image.content_type)
        .bind(image.uploaded_at)
        .bind(image.created_at)
        .bind(image.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn find_image(&self, id: &str) -> sqlx::Result<Option<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Every image, oldest insert first.
    pub async fn list_images(&self) -> sqlx::Result<Vec<Image>> {
        sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images ORDER BY rowid ASC"
        ))
        .fetch_all(&*self.db)
        .await
    }

    /// Returns the number of rows removed (0 or 1).
    pub async fn delete_image(&self, id: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Look a tag up by its exact name, inserting it first if absent.
    ///
    /// The insert is `ON CONFLICT DO NOTHING` against the unique index on
    /// `name`, so two callers racing on a new name both end up reading the
    /// same row.
    pub async fn find_or_create_tag(&self, name: &str) -> sqlx::Result<Tag> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tags (name, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await?;

        sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at, updated_at FROM tags WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
    }

    pub async fn find_tag(&self, name: &str) -> sqlx::Result<Option<Tag>> {
        sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at, updated_at FROM tags WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await
    }

    pub async fn list_tags(&self) -> sqlx::Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>("SELECT id, name, created_at, updated_at FROM tags ORDER BY id")
            .fetch_all(&*self.db)
            .await
    }

    /// Names of the tags attached to an image, in attachment order.
    pub async fn tag_names_for_image(&self, image_id: &str) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM image_tags it
             JOIN tags t ON t.id = it.tag_id
             WHERE it.image_id = ?
             ORDER BY it.rowid ASC",
        )
        .bind(image_id)
        .fetch_all(&*self.db)
        .await
    }

    /// Images attached to a tag, in attachment order. Links whose image
    /// record is gone drop out of the join.
    pub async fn images_for_tag(&self, tag_id: i64) -> sqlx::Result<Vec<Image>> {
        sqlx::query_as::<_, Image>(
            "SELECT i.id, i.object_key, i.name, i.size, i.content_type, i.uploaded_at,
                    i.created_at, i.updated_at
             FROM image_tags it
             JOIN images i ON i.id = it.image_id
             WHERE it.tag_id = ?
             ORDER BY it.rowid ASC",
        )
        .bind(tag_id)
        .fetch_all(&*self.db)
        .await
    }

    /// Link an image to a tag. Returns the new row, or `None` when the pair
    /// was already linked.
    pub async fn associate(&self, image_id: &str, tag_id: i64) -> sqlx::Result<Option<ImageTag>> {
        sqlx::query_as::<_, ImageTag>(
            "INSERT INTO image_tags (image_id, tag_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(image_id, tag_id) DO NOTHING
             RETURNING image_id, tag_id, created_at",
        )
        .bind(image_id)
        .bind(tag_id)
        .bind(Utc::now())
        .fetch_optional(&*self.db)
        .await
    }

    pub async fn delete_associations(&self, image_id: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM image_tags WHERE image_id = ?")
            .bind(image_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// True when the error means the store could not be reached at all, as
/// opposed to a query that reached it and failed.
pub fn is_unreachable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
    )
}
