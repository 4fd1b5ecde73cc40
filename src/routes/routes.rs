//! Defines routes for the image catalog API.
//!
//! ## Structure
//! - **Image endpoints**
//!   - `GET    /api/images`               — list images (falls back to storage listing)
//!   - `POST   /api/images`               — upload (multipart: `image`, optional `tags`)
//!   - `GET    /api/images/{id}`          — one image with a presigned URL
//!   - `DELETE /api/images/{id}`          — delete payload, tag links and record
//!   - `GET    /api/images/{id}/content`  — raw bytes
//!   - `POST   /api/images/{id}/tags`     — attach tags (`{"tags": [..]}`)
//!   - `GET    /api/images/tags/{tag}`    — images carrying a tag
//!
//! - **Tag endpoints**
//!   - `GET    /api/tags`                 — every tag

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{
            attach_tags, delete_image, get_image, get_image_content, list_images,
            list_images_by_tag, upload_image,
        },
        tag_handlers::list_tags,
    },
    services::catalog_service::CatalogService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Build and return the router for the catalog API.
///
/// The router carries shared state (`CatalogService`) to all handlers.
/// `max_upload_bytes` bounds request bodies; `cors_origins` empty means any
/// origin is allowed.
pub fn routes(max_upload_bytes: usize, cors_origins: &[String]) -> Router<CatalogService> {
    let api = Router::new()
        .route("/images", get(list_images).post(upload_image))
        .route("/images/tags/{tag}", get(list_images_by_tag))
        .route("/images/{id}", get(get_image).delete(delete_image))
        .route("/images/{id}/content", get(get_image_content))
        .route("/images/{id}/tags", post(attach_tags))
        .route("/tags", get(list_tags));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(12 * 60 * 60));

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer
        .allow_origin(AllowOrigin::list(parsed))
        .allow_credentials(true)
}
