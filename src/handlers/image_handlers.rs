//! HTTP handlers for image operations.
//! Parse the request, delegate to `CatalogService`, serialize the result.

use crate::{
    errors::AppError,
    models::descriptor::ImageDescriptor,
    services::catalog_service::{CatalogService, NewImage},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/images/{id}/tags`.
#[derive(Debug, Deserialize)]
pub struct AttachTagsReq {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResp {
    pub id: String,
    pub status: &'static str,
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResp {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachTagsResp {
    pub status: &'static str,
    pub added_tags: Vec<String>,
}

/// GET `/api/images`: every image, degrading to a storage-only listing.
pub async fn list_images(
    State(catalog): State<CatalogService>,
) -> Result<Json<Vec<ImageDescriptor>>, AppError> {
    Ok(Json(catalog.list_images().await?))
}

/// GET `/api/images/{id}`
pub async fn get_image(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> Result<Json<ImageDescriptor>, AppError> {
    let entry = catalog.get_image(&id).await?;
    Ok(Json(catalog.describe(entry).await?))
}

/// GET `/api/images/{id}/content`
pub async fn get_image_content(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let content = catalog.image_content(&id).await?;

    let mut response = Response::new(Body::from(content.bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", content.name.replace('"', "")))
    {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// GET `/api/images/tags/{tag}`
pub async fn list_images_by_tag(
    State(catalog): State<CatalogService>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<ImageDescriptor>>, AppError> {
    Ok(Json(catalog.list_images_by_tag(&tag).await?))
}

/// POST `/api/images`: multipart with an `image` file and optional `tags`
/// text field holding comma-separated names.
pub async fn upload_image(
    State(catalog): State<CatalogService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file = None;
    let mut tags_raw = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().map(str::to_owned).as_deref() {
            Some("image") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let size_hint = field
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let bytes = field.bytes().await?;
                file = Some((name, size_hint, bytes));
            }
            Some("tags") => tags_raw = Some(field.text().await?),
            _ => {}
        }
    }

    let Some((original_name, size_hint, bytes)) = file else {
        return Err(AppError::bad_request("missing `image` file field"));
    };

    let receipt = catalog
        .upload_image(NewImage {
            bytes,
            original_name,
            size_hint,
            tags_raw,
        })
        .await?;

    Ok(Json(UploadResp {
        id: receipt.id,
        status: "success",
        file: receipt.name,
    }))
}

/// DELETE `/api/images/{id}`
pub async fn delete_image(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResp>, AppError> {
    let image = catalog.delete_image(&id).await?;
    Ok(Json(DeleteResp {
        status: "success",
        message: format!("image {} deleted", image.id),
    }))
}

/// POST `/api/images/{id}/tags`
pub async fn attach_tags(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
    Json(payload): Json<AttachTagsReq>,
) -> Result<Json<AttachTagsResp>, AppError> {
    let added_tags = catalog.attach_tags(&id, &payload.tags).await?;
    Ok(Json(AttachTagsResp {
        status: "success",
        added_tags,
    }))
}
