//! Client-facing view of an image.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::image::Image;

/// What the API hands back for an image: the catalog record joined with a
/// freshly minted presigned URL and the image's tag names.
///
/// `tags` always serializes as an array, empty when the image has none.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub id: String,
    pub url: String,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl ImageDescriptor {
    pub fn from_image(image: &Image, url: String, tags: Vec<String>) -> Self {
        Self {
            id: image.id.clone(),
            url,
            name: image.name.clone(),
            size: image.size,
            content_type: image.content_type.clone(),
            uploaded_at: image.uploaded_at,
            tags,
        }
    }
}
