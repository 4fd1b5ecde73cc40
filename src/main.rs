use anyhow::{Context, Result};
use axum::Router;
use image_catalog::{
    config::AppConfig,
    routes,
    services::{
        catalog_service::CatalogService,
        diagnostics::TracingObserver,
        metadata_store::MetadataStore,
        object_store::{ObjectStore, S3ObjectStore},
    },
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("image_catalog=info,tower_http=info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-catalog with config: {:?}", cfg.redacted());

    // --- Metadata store (optional) ---
    let metadata = connect_metadata(&cfg).await;

    // --- Handle migration mode ---
    if migrate {
        metadata.context("metadata store unavailable, migration failed")?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Object store + bucket provisioning ---
    let objects = S3ObjectStore::connect(&cfg.s3_settings()).await;
    objects
        .ensure_bucket(&cfg.bucket)
        .await
        .with_context(|| format!("ensuring bucket `{}` exists", cfg.bucket))?;
    let objects: Arc<dyn ObjectStore> = Arc::new(objects);

    // --- Initialize core service ---
    let catalog = CatalogService::new(
        objects,
        metadata,
        cfg.catalog_settings(),
        Arc::new(TracingObserver),
    );

    // --- Build router ---
    let app: Router =
        routes::routes::routes(cfg.max_upload_bytes, &cfg.cors_origins).with_state(catalog);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open and migrate the metadata store. Any failure is logged and the
/// service runs without metadata, serving listings from storage alone.
async fn connect_metadata(cfg: &AppConfig) -> Option<MetadataStore> {
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Create parent directory of a file-backed SQLite database if needed
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if !db_path.is_empty() && !db_path.starts_with(':') {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                match std::fs::create_dir_all(parent) {
                    Ok(()) => tracing::info!("Created missing directory {:?}", parent),
                    Err(e) => tracing::warn!("Failed to create {:?}: {}", parent, e),
                }
            }
        }
    }

    let store = match MetadataStore::connect(db_url, 5, cfg.store_timeout).await {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!(
                "Metadata store unavailable ({}); continuing with storage-only listings",
                err
            );
            return None;
        }
    };

    match store.migrate().await {
        Ok(applied) => {
            tracing::info!("Metadata schema ready ({} statements)", applied);
            Some(store)
        }
        Err(err) => {
            tracing::warn!(
                "Metadata schema migration failed ({}); continuing without metadata",
                err
            );
            None
        }
    }
}
