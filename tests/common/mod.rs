//! Shared test harness for integration tests.
//!
//! Provides an in-memory [`ObjectStore`] with failure switches, an in-memory
//! SQLite [`MetadataStore`], and an observer that records every
//! [`CatalogEvent`] so degraded paths can be asserted on.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image_catalog::services::{
    catalog_service::{CatalogService, CatalogSettings, NewImage},
    diagnostics::{CatalogEvent, CatalogObserver},
    metadata_store::MetadataStore,
    object_store::{ObjectStore, ObjectStoreError, ObjectStoreResult, ObjectSummary},
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

pub const BUCKET: &str = "images";
pub const UPLOAD_DIR: &str = "uploads/";

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

/// Object store kept in a map keyed by `bucket/key`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_list: AtomicBool,
    /// Keys whose presign calls fail.
    pub unsignable: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(BUCKET.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Put an object directly, bypassing the catalog.
    pub fn seed(&self, key: &str, body: &'static [u8]) {
        self.objects.lock().unwrap().insert(
            (BUCKET.to_string(), key.to_string()),
            StoredObject {
                body: Bytes::from_static(body),
                content_type: "application/octet-stream".into(),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn refuse_to_sign(&self, key: &str) {
        self.unsignable.lock().unwrap().insert(key.to_string());
    }

    fn failure(operation: &'static str, bucket: &str, key: &str) -> ObjectStoreError {
        ObjectStoreError::Request {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: "injected failure".into(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::failure("put_object", bucket, key));
        }
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> ObjectStoreResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::failure("delete_object", bucket, key));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> ObjectStoreResult<Vec<ObjectSummary>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::failure("list_objects_v2", bucket, prefix));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|((_, key), obj)| ObjectSummary {
                key: key.clone(),
                size: obj.body.len() as i64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn signed_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ObjectStoreResult<String> {
        if self.unsignable.lock().unwrap().contains(key) {
            return Err(Self::failure("presign_get_object", bucket, key));
        }
        Ok(format!(
            "http://minio.test/{}/{}?X-Amz-Expires={}",
            bucket,
            key,
            ttl.as_secs()
        ))
    }

    async fn bucket_exists(&self, bucket: &str) -> ObjectStoreResult<bool> {
        Ok(bucket == BUCKET)
    }
}

/// Observer that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<CatalogEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<CatalogEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CatalogObserver for RecordingObserver {
    fn observe(&self, event: CatalogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory SQLite database with the schema applied. One connection only,
/// since every `:memory:` connection is its own database.
pub async fn memory_metadata() -> MetadataStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    let store = MetadataStore::new(Arc::new(pool));
    store.migrate().await.expect("migration failed");
    store
}

pub struct TestHarness {
    pub catalog: CatalogService,
    pub objects: Arc<MemoryObjectStore>,
    pub metadata: Option<MetadataStore>,
    pub observer: Arc<RecordingObserver>,
}

impl TestHarness {
    /// Catalog with both stores available.
    pub async fn new() -> Self {
        Self::build(Some(memory_metadata().await))
    }

    /// Catalog that never had a metadata store.
    pub fn without_metadata() -> Self {
        Self::build(None)
    }

    fn build(metadata: Option<MetadataStore>) -> Self {
        let objects = Arc::new(MemoryObjectStore::default());
        let observer = Arc::new(RecordingObserver::default());
        let catalog = CatalogService::new(
            objects.clone(),
            metadata.clone(),
            CatalogSettings {
                bucket: BUCKET.into(),
                upload_dir: UPLOAD_DIR.into(),
                url_ttl: Duration::from_secs(3600),
            },
            observer.clone(),
        );
        Self {
            catalog,
            objects,
            metadata,
            observer,
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        self.metadata.as_ref().expect("harness has no metadata store")
    }

    /// Upload `bytes` as `name` with optional comma-separated tags.
    pub async fn upload(&self, name: &str, bytes: &'static [u8], tags: Option<&str>) -> String {
        self.catalog
            .upload_image(NewImage {
                bytes: Bytes::from_static(bytes),
                original_name: name.to_string(),
                size_hint: None,
                tags_raw: tags.map(String::from),
            })
            .await
            .expect("upload failed")
            .id
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
