use crate::{errors::AppError, models::tag::Tag, services::catalog_service::CatalogService};
use axum::{Json, extract::State};

/// GET `/api/tags`
pub async fn list_tags(State(catalog): State<CatalogService>) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(catalog.list_tags().await?))
}
