//! Object-key layout, identifier generation, content-type inference and
//! tag-list normalization.
//!
//! Everything here is pure so the catalog and the assembler agree on how a
//! key is built from an id and how an id is recovered from a key.

use std::{
    collections::HashSet,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Generate an image identifier: `<unix-nanos>-<8 hex chars>`.
///
/// The random suffix comes from a v4 UUID so two calls in the same
/// nanosecond still differ. Only ASCII digits, lowercase hex and `-` are
/// produced, which keeps the id safe to embed in an object key.
pub fn generate_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", nanos, &suffix[..8])
}

/// Extension (with the leading dot) of the base name of `original_name`.
///
/// Returns an empty string when there is no extension or when it contains
/// anything other than ASCII letters and digits.
pub fn extension_of(original_name: &str) -> String {
    let base = base_name(original_name);
    match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            format!(".{}", ext)
        }
        _ => String::new(),
    }
}

/// Last path segment of `key`, splitting on both `/` and `\`.
pub fn base_name(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}

/// Build the key under which an upload is stored: `<dir>/<id><ext>`.
pub fn object_key(upload_dir: &str, id: &str, ext: &str) -> String {
    let dir = upload_dir.trim_matches('/');
    if dir.is_empty() {
        format!("{}{}", id, ext)
    } else {
        format!("{}/{}{}", dir, id, ext)
    }
}

/// Prefix to list when reconstructing the catalog from storage alone.
pub fn listing_prefix(upload_dir: &str) -> String {
    let dir = upload_dir.trim_matches('/');
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    }
}

/// True for keys that name a "directory" rather than an uploaded object.
pub fn is_directory_marker(key: &str, prefix: &str) -> bool {
    key.is_empty() || key == prefix || key == prefix.trim_end_matches('/') || key.ends_with('/')
}

/// Best-effort id for an object found only in storage: its base filename
/// with the extension removed.
pub fn id_from_key(key: &str) -> String {
    let base = base_name(key);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[..idx].to_string(),
        _ => base.to_string(),
    }
}

/// MIME type for a file extension. Unknown extensions map to
/// `application/octet-stream`.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "ico" => "image/x-icon",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Split a comma-separated tag string into normalized names.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    normalize_tag_names(raw.split(','))
}

/// Trim each name, drop empties and collapse duplicates, keeping first-seen
/// order. Comparison is case-sensitive.
pub fn normalize_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    out
}
