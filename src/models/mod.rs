//! Core data models for the image catalog.
//!
//! Records map to SQLite tables via `sqlx::FromRow` and serialize as
//! camelCase JSON, which is the shape clients of the HTTP API observe.

pub mod descriptor;
pub mod image;
pub mod tag;
