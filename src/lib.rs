//! Image catalog: uploads land in an S3-compatible bucket, their metadata
//! and tags in SQLite, and reads come back as descriptors carrying presigned
//! URLs.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
