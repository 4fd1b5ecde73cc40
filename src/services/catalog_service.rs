//! src/services/catalog_service.rs
//!
//! CatalogService: owns the write path for images, tags and their links.
//! Bytes live in the object store, which is authoritative; records and tags
//! live in the metadata store, which is optional. The two are never written
//! transactionally: uploads write the object first, deletes remove the object
//! first, and metadata failures are reported through the observer wherever
//! the operation can still succeed.

use crate::{
    models::{
        descriptor::ImageDescriptor,
        image::{CatalogEntry, Image},
        tag::Tag,
    },
    services::{
        diagnostics::{CatalogEvent, CatalogObserver},
        layout,
        metadata_store::{MetadataStore, is_unreachable},
        object_store::{ObjectStore, ObjectStoreError},
        response_assembler::ResponseAssembler,
    },
};
use bytes::Bytes;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("image `{0}` not found")]
    ImageNotFound(String),
    #[error("tag `{0}` not found")]
    TagNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("object store unavailable: {0}")]
    StorageUnavailable(#[source] ObjectStoreError),
    #[error("metadata store unavailable: {0}")]
    MetadataUnavailable(String),
    #[error("metadata store error: {0}")]
    Metadata(#[source] sqlx::Error),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if is_unreachable(&err) {
            CatalogError::MetadataUnavailable(err.to_string())
        } else {
            CatalogError::Metadata(err)
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

const NOT_CONFIGURED: &str = "no metadata store configured";

/// Where uploads go and how long their URLs stay valid.
#[derive(Clone, Debug)]
pub struct CatalogSettings {
    pub bucket: String,
    pub upload_dir: String,
    pub url_ttl: Duration,
}

/// An upload as received from a client.
#[derive(Clone, Debug)]
pub struct NewImage {
    pub bytes: Bytes,
    pub original_name: String,
    /// Length the client announced, if any. The recorded size is always the
    /// number of bytes actually stored.
    pub size_hint: Option<u64>,
    /// Comma-separated tag names, e.g. `"a, b ,b,"`.
    pub tags_raw: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadReceipt {
    pub id: String,
    pub object_key: String,
    pub name: String,
}

/// Raw payload of an image together with its stored content type.
#[derive(Clone, Debug)]
pub struct ImageContent {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Reachability of the metadata store, for readiness reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataStatus {
    Disabled,
    Ok,
    Error(String),
}

#[derive(Clone)]
pub struct CatalogService {
    objects: Arc<dyn ObjectStore>,
    metadata: Option<MetadataStore>,
    assembler: ResponseAssembler,
    observer: Arc<dyn CatalogObserver>,
    bucket: String,
    upload_dir: String,
}

impl CatalogService {
    /// Wire the catalog to its two stores. `metadata` is `None` when no
    /// database could be opened; the catalog then runs degraded.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Option<MetadataStore>,
        settings: CatalogSettings,
        observer: Arc<dyn CatalogObserver>,
    ) -> Self {
        let assembler = ResponseAssembler::new(
            objects.clone(),
            observer.clone(),
            settings.bucket.clone(),
            settings.upload_dir.clone(),
            settings.url_ttl,
        );
        Self {
            objects,
            metadata,
            assembler,
            observer,
            bucket: settings.bucket,
            upload_dir: settings.upload_dir,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn metadata(&self) -> CatalogResult<&MetadataStore> {
        self.metadata
            .as_ref()
            .ok_or_else(|| CatalogError::MetadataUnavailable(NOT_CONFIGURED.into()))
    }

    /// Metadata store if configured and answering its health probe.
    async fn reachable_metadata(&self, operation: &'static str) -> Option<&MetadataStore> {
        let Some(metadata) = self.metadata.as_ref() else {
            self.observer.observe(CatalogEvent::MetadataUnavailable {
                operation,
                reason: NOT_CONFIGURED.into(),
            });
            return None;
        };

        match metadata.ping().await {
            Ok(()) => Some(metadata),
            Err(err) => {
                self.observer.observe(CatalogEvent::MetadataUnavailable {
                    operation,
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    async fn find_image(&self, metadata: &MetadataStore, id: &str) -> CatalogResult<Image> {
        metadata
            .find_image(id)
            .await?
            .ok_or_else(|| CatalogError::ImageNotFound(id.to_string()))
    }

    /// Find-or-create the tag, then link it. `Ok(true)` when the link is new.
    async fn link_tag(
        &self,
        metadata: &MetadataStore,
        image_id: &str,
        name: &str,
    ) -> sqlx::Result<bool> {
        let tag = metadata.find_or_create_tag(name).await?;
        Ok(metadata.associate(image_id, tag.id).await?.is_some())
    }

    async fn tags_or_empty(&self, metadata: &MetadataStore, image_id: &str) -> Vec<String> {
        match metadata.tag_names_for_image(image_id).await {
            Ok(tags) => tags,
            Err(err) => {
                self.observer.observe(CatalogEvent::TagLookupFailed {
                    image_id: image_id.to_string(),
                    error: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    async fn describe_all(
        &self,
        metadata: &MetadataStore,
        images: Vec<Image>,
    ) -> Vec<ImageDescriptor> {
        let mut descriptors = Vec::with_capacity(images.len());
        for image in images {
            let tags = self.tags_or_empty(metadata, &image.id).await;
            if let Some(descriptor) = self.assembler.try_build_descriptor(&image, tags).await {
                descriptors.push(descriptor);
            }
        }
        descriptors
    }

    /// Store an upload and record it.
    ///
    /// Only the object write can fail the call. Once the bytes are stored the
    /// id is returned even if the record or any tag link could not be
    /// written; those failures go to the observer.
    #[instrument(skip(self, upload), fields(name = %upload.original_name))]
    pub async fn upload_image(&self, upload: NewImage) -> CatalogResult<UploadReceipt> {
        let id = layout::generate_id();
        let ext = layout::extension_of(&upload.original_name);
        let object_key = layout::object_key(&self.upload_dir, &id, &ext);
        let content_type = layout::content_type_for(&ext);
        let size = upload.bytes.len() as i64;

        if let Some(hinted) = upload.size_hint {
            if hinted != size as u64 {
                self.observer.observe(CatalogEvent::SizeHintMismatch {
                    image_id: id.clone(),
                    hinted,
                    actual: size as u64,
                });
            }
        }

        self.objects
            .put(&self.bucket, &object_key, upload.bytes, content_type)
            .await
            .map_err(CatalogError::StorageUnavailable)?;
        info!(image_id = %id, object_key = %object_key, size, "stored image payload");

        let receipt = UploadReceipt {
            id: id.clone(),
            object_key: object_key.clone(),
            name: upload.original_name.clone(),
        };
        let tags = upload
            .tags_raw
            .as_deref()
            .map(layout::parse_tag_list)
            .unwrap_or_default();

        let Some(metadata) = self.metadata.as_ref() else {
            self.observer.observe(CatalogEvent::MetadataUnavailable {
                operation: "upload_image",
                reason: NOT_CONFIGURED.into(),
            });
            return Ok(receipt);
        };

        let now = Utc::now();
        let image = Image {
            id: id.clone(),
            object_key,
            name: upload.original_name,
            size,
            content_type: content_type.to_string(),
            uploaded_at: now,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = metadata.insert_image(&image).await {
            let error = err.to_string();
            self.observer.observe(CatalogEvent::ImageRecordWriteFailed {
                image_id: id.clone(),
                error: error.clone(),
            });
            // tag rows are still created, only the links are missing
            for tag in tags {
                let error = match metadata.find_or_create_tag(&tag).await {
                    Ok(_) => format!("image record missing: {}", error),
                    Err(err) => err.to_string(),
                };
                self.observer.observe(CatalogEvent::TagAssociationFailed {
                    image_id: id.clone(),
                    tag,
                    error,
                });
            }
            return Ok(receipt);
        }

        for tag in tags {
            if let Err(err) = self.link_tag(metadata, &id, &tag).await {
                self.observer.observe(CatalogEvent::TagAssociationFailed {
                    image_id: id.clone(),
                    tag,
                    error: err.to_string(),
                });
            }
        }

        Ok(receipt)
    }

    /// Record and tag names for `id`. An object in storage without a record
    /// is still `ImageNotFound`.
    #[instrument(skip(self))]
    pub async fn get_image(&self, id: &str) -> CatalogResult<CatalogEntry> {
        let metadata = self.metadata()?;
        let image = self.find_image(metadata, id).await?;
        let tags = metadata.tag_names_for_image(id).await?;
        Ok(CatalogEntry { image, tags })
    }

    /// Descriptor for a single entry, with a fresh URL.
    pub async fn describe(&self, entry: CatalogEntry) -> CatalogResult<ImageDescriptor> {
        self.assembler
            .build_descriptor(&entry.image, entry.tags)
            .await
    }

    /// Every image as a descriptor.
    ///
    /// Falls back to a listing rebuilt from storage when the metadata store
    /// is absent or unreachable. Entries whose descriptor cannot be built are
    /// left out.
    #[instrument(skip(self))]
    pub async fn list_images(&self) -> CatalogResult<Vec<ImageDescriptor>> {
        let Some(metadata) = self.reachable_metadata("list_images").await else {
            return Ok(self.assembler.list_from_storage_only().await);
        };

        let images = match metadata.list_images().await {
            Ok(images) => images,
            Err(err) if is_unreachable(&err) => {
                self.observer.observe(CatalogEvent::MetadataUnavailable {
                    operation: "list_images",
                    reason: err.to_string(),
                });
                return Ok(self.assembler.list_from_storage_only().await);
            }
            Err(err) => return Err(err.into()),
        };

        Ok(self.describe_all(metadata, images).await)
    }

    /// Images carrying the tag named exactly `tag_name`.
    #[instrument(skip(self))]
    pub async fn list_images_by_tag(&self, tag_name: &str) -> CatalogResult<Vec<ImageDescriptor>> {
        let metadata = self.metadata()?;
        let tag = metadata
            .find_tag(tag_name)
            .await?
            .ok_or_else(|| CatalogError::TagNotFound(tag_name.to_string()))?;
        let images = metadata.images_for_tag(tag.id).await?;
        Ok(self.describe_all(metadata, images).await)
    }

    /// Remove an image: payload first, then its tag links, then the record.
    ///
    /// A failed payload delete leaves everything untouched. A failed link
    /// cleanup is only reported to the observer. A failed record delete is
    /// returned even though the payload is already gone.
    #[instrument(skip(self))]
    pub async fn delete_image(&self, id: &str) -> CatalogResult<Image> {
        let metadata = self.metadata()?;
        let image = self.find_image(metadata, id).await?;

        self.objects
            .delete(&self.bucket, &image.object_key)
            .await
            .map_err(CatalogError::StorageUnavailable)?;

        match metadata.delete_associations(id).await {
            Ok(removed) => debug!(removed, "removed tag links"),
            Err(err) => self.observer.observe(CatalogEvent::AssociationCleanupFailed {
                image_id: id.to_string(),
                error: err.to_string(),
            }),
        }

        if metadata.delete_image(id).await? == 0 {
            return Err(CatalogError::ImageNotFound(id.to_string()));
        }

        info!(object_key = %image.object_key, "deleted image");
        Ok(image)
    }

    /// Attach tags to an existing image and return the names that were not
    /// attached before. Names are trimmed; duplicates collapse.
    #[instrument(skip(self, tag_names))]
    pub async fn attach_tags(&self, id: &str, tag_names: &[String]) -> CatalogResult<Vec<String>> {
        let metadata = self.metadata()?;
        self.find_image(metadata, id).await?;

        let names = layout::normalize_tag_names(tag_names);
        if names.is_empty() {
            return Err(CatalogError::InvalidInput(
                "at least one non-empty tag name is required".into(),
            ));
        }

        let mut added = Vec::new();
        for name in names {
            match self.link_tag(metadata, id, &name).await {
                Ok(true) => added.push(name),
                Ok(false) => {}
                Err(err) => self.observer.observe(CatalogEvent::TagAssociationFailed {
                    image_id: id.to_string(),
                    tag: name,
                    error: err.to_string(),
                }),
            }
        }

        Ok(added)
    }

    pub async fn list_tags(&self) -> CatalogResult<Vec<Tag>> {
        Ok(self.metadata()?.list_tags().await?)
    }

    /// Payload of an image, fetched through its record.
    #[instrument(skip(self))]
    pub async fn image_content(&self, id: &str) -> CatalogResult<ImageContent> {
        let metadata = self.metadata()?;
        let image = self.find_image(metadata, id).await?;
        let bytes = self
            .objects
            .get(&self.bucket, &image.object_key)
            .await
            .map_err(|err| match err {
                ObjectStoreError::NotFound { .. } => CatalogError::ImageNotFound(id.to_string()),
                other => CatalogError::StorageUnavailable(other),
            })?;

        Ok(ImageContent {
            name: image.name,
            content_type: image.content_type,
            bytes,
        })
    }

    pub async fn metadata_status(&self) -> MetadataStatus {
        match self.metadata.as_ref() {
            None => MetadataStatus::Disabled,
            Some(metadata) => match metadata.ping().await {
                Ok(()) => MetadataStatus::Ok,
                Err(err) => MetadataStatus::Error(err.to_string()),
            },
        }
    }

    pub async fn storage_ready(&self) -> Result<bool, ObjectStoreError> {
        self.objects.bucket_exists(&self.bucket).await
    }
}
