//! Represents one stored image asset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata record for an image whose bytes live in the object store.
///
/// The record never carries the payload itself; `object_key` points at it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Identifier assigned at upload time. Also the stem of `object_key`.
    pub id: String,

    /// Key of the payload inside the bucket, e.g. `uploads/1729-ab12cd34.png`.
    pub object_key: String,

    /// Original filename as supplied by the uploader. Display only.
    pub name: String,

    /// Number of bytes written to the object store.
    pub size: i64,

    /// MIME type inferred from the file extension.
    pub content_type: String,

    /// Logical upload time.
    pub uploaded_at: DateTime<Utc>,

    /// When the record was inserted.
    pub created_at: DateTime<Utc>,

    /// When the record was last touched.
    pub updated_at: DateTime<Utc>,
}

/// An image record joined with the names of its tags.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub image: Image,
    pub tags: Vec<String>,
}
