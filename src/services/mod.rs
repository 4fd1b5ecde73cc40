//! Catalog core and the two stores it sits between.

pub mod catalog_service;
pub mod diagnostics;
pub mod layout;
pub mod metadata_store;
pub mod object_store;
pub mod response_assembler;
