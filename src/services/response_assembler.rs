//! Builds client-facing [`ImageDescriptor`]s.
//!
//! Two paths: join a catalog record with a fresh presigned URL, or rebuild a
//! whole listing from the object store alone when metadata is unavailable.

use crate::{
    models::{descriptor::ImageDescriptor, image::Image},
    services::{
        catalog_service::{CatalogError, CatalogResult},
        diagnostics::{CatalogEvent, CatalogObserver},
        layout,
        object_store::{ObjectStore, ObjectSummary},
    },
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Validity window of presigned URLs unless configured otherwise.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct ResponseAssembler {
    objects: Arc<dyn ObjectStore>,
    observer: Arc<dyn CatalogObserver>,
    bucket: String,
    upload_dir: String,
    url_ttl: Duration,
}

impl ResponseAssembler {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        observer: Arc<dyn CatalogObserver>,
        bucket: impl Into<String>,
        upload_dir: impl Into<String>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            objects,
            observer,
            bucket: bucket.into(),
            upload_dir: upload_dir.into(),
            url_ttl,
        }
    }

    /// Join `image` with a presigned URL and its tag names.
    ///
    /// Fails with `StorageUnavailable` when the URL cannot be minted; batch
    /// callers skip the record in that case.
    pub async fn build_descriptor(
        &self,
        image: &Image,
        tags: Vec<String>,
    ) -> CatalogResult<ImageDescriptor> {
        let url = self
            .objects
            .signed_get_url(&self.bucket, &image.object_key, self.url_ttl)
            .await
            .map_err(CatalogError::StorageUnavailable)?;
        Ok(ImageDescriptor::from_image(image, url, tags))
    }

    /// Like [`build_descriptor`](Self::build_descriptor) but reports a
    /// failure to the observer and yields `None` instead of an error.
    pub async fn try_build_descriptor(
        &self,
        image: &Image,
        tags: Vec<String>,
    ) -> Option<ImageDescriptor> {
        match self.build_descriptor(image, tags).await {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                self.observer.observe(CatalogEvent::DescriptorSkipped {
                    object_key: image.object_key.clone(),
                    error: err.to_string(),
                });
                None
            }
        }
    }

    /// Reconstruct descriptors from the object listing under the upload
    /// prefix. Used only when the metadata store is unavailable.
    ///
    /// Ids are the object base names without extension and tags are always
    /// empty. Objects whose URL cannot be minted are skipped, and a listing
    /// that fails outright yields an empty result.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn list_from_storage_only(&self) -> Vec<ImageDescriptor> {
        let prefix = layout::listing_prefix(&self.upload_dir);
        let listing = match self.objects.list(&self.bucket, &prefix).await {
            Ok(listing) => listing,
            Err(err) => {
                self.observer.observe(CatalogEvent::StorageListingFailed {
                    prefix,
                    error: err.to_string(),
                });
                return Vec::new();
            }
        };

        let mut descriptors = Vec::with_capacity(listing.len());
        for summary in listing {
            if layout::is_directory_marker(&summary.key, &prefix) {
                continue;
            }
            match self
                .objects
                .signed_get_url(&self.bucket, &summary.key, self.url_ttl)
                .await
            {
                Ok(url) => descriptors.push(descriptor_from_summary(&summary, url)),
                Err(err) => self.observer.observe(CatalogEvent::DescriptorSkipped {
                    object_key: summary.key.clone(),
                    error: err.to_string(),
                }),
            }
        }

        debug!(count = descriptors.len(), "rebuilt listing from storage");
        descriptors
    }
}

fn descriptor_from_summary(summary: &ObjectSummary, url: String) -> ImageDescriptor {
    let filename = layout::base_name(&summary.key);
    let ext = layout::extension_of(filename);
    ImageDescriptor {
        id: layout::id_from_key(&summary.key),
        url,
        name: filename.to_string(),
        size: summary.size,
        content_type: layout::content_type_for(&ext).to_string(),
        uploaded_at: summary.last_modified.unwrap_or_else(Utc::now),
        tags: Vec::new(),
    }
}
