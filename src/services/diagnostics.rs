//! Side channel for failures the catalog absorbs instead of returning.
//!
//! The upload and listing paths deliberately swallow some errors (a metadata
//! write after a successful object write, a descriptor whose URL could not be
//! minted). Each such case is reported as a [`CatalogEvent`] to the injected
//! [`CatalogObserver`] so it is neither lost nor invisible to tests.

use std::fmt;

/// A failure the catalog recovered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogEvent {
    /// The metadata store is not configured or did not answer; the operation
    /// continued in degraded mode.
    MetadataUnavailable { operation: &'static str, reason: String },
    /// The object was written but its record was not.
    ImageRecordWriteFailed { image_id: String, error: String },
    /// A tag could not be created or linked to an image.
    TagAssociationFailed {
        image_id: String,
        tag: String,
        error: String,
    },
    /// Tag names for an image could not be read; the image was served
    /// without tags.
    TagLookupFailed { image_id: String, error: String },
    /// Associations of a deleted image could not be removed.
    AssociationCleanupFailed { image_id: String, error: String },
    /// A listing entry was left out because its descriptor could not be
    /// built.
    DescriptorSkipped { object_key: String, error: String },
    /// The storage-only fallback could not list the bucket and served an
    /// empty listing.
    StorageListingFailed { prefix: String, error: String },
    /// The caller's size hint disagreed with the bytes actually received.
    SizeHintMismatch {
        image_id: String,
        hinted: u64,
        actual: u64,
    },
}

impl fmt::Display for CatalogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataUnavailable { operation, reason } => {
                write!(f, "metadata store unavailable during {}: {}", operation, reason)
            }
            Self::ImageRecordWriteFailed { image_id, error } => {
                write!(f, "failed to record image {}: {}", image_id, error)
            }
            Self::TagAssociationFailed {
                image_id,
                tag,
                error,
            } => write!(f, "failed to tag image {} with `{}`: {}", image_id, tag, error),
            Self::TagLookupFailed { image_id, error } => {
                write!(f, "failed to read tags of image {}: {}", image_id, error)
            }
            Self::AssociationCleanupFailed { image_id, error } => {
                write!(f, "failed to remove tags of image {}: {}", image_id, error)
            }
            Self::DescriptorSkipped { object_key, error } => {
                write!(f, "skipped {} in listing: {}", object_key, error)
            }
            Self::StorageListingFailed { prefix, error } => {
                write!(f, "could not list objects under `{}`: {}", prefix, error)
            }
            Self::SizeHintMismatch {
                image_id,
                hinted,
                actual,
            } => write!(
                f,
                "image {} declared {} bytes but {} were received",
                image_id, hinted, actual
            ),
        }
    }
}

/// Receives [`CatalogEvent`]s.
pub trait CatalogObserver: Send + Sync {
    fn observe(&self, event: CatalogEvent);
}

/// Default observer: every event becomes a `warn!` line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CatalogObserver for TracingObserver {
    fn observe(&self, event: CatalogEvent) {
        match &event {
            CatalogEvent::SizeHintMismatch { .. } => tracing::debug!(event = ?event, "{}", event),
            _ => tracing::warn!(event = ?event, "{}", event),
        }
    }
}
