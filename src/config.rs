use crate::services::{
    catalog_service::CatalogSettings, object_store::S3Settings,
    response_assembler::DEFAULT_URL_TTL,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub bucket: String,
    pub upload_dir: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub access_key: String,
    pub secret_key: String,
    pub presign_ttl: Duration,
    pub store_timeout: Duration,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image catalog API backed by S3-compatible storage")]
pub struct Args {
    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Metadata database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket holding image payloads (overrides BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix for uploads (overrides UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// S3 endpoint URL (overrides MINIO_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 signing region (overrides AWS_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Presigned URL validity in seconds (overrides PRESIGNED_URL_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Per-operation timeout for store calls in seconds (overrides STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub store_timeout_secs: Option<u64>,

    /// Largest accepted request body in bytes (overrides MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Comma-separated allowed CORS origins; empty allows any (overrides CORS_ALLOWED_ORIGINS)
    #[arg(long)]
    pub cors_origins: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values returned by `lookup`, then defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let access_key = var("AWS_ACCESS_KEY_ID");
        let secret_key = var("AWS_SECRET_ACCESS_KEY");
        let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
            bail!("AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must both be set");
        };

        let env_port = parse_var(&var, "CATALOG_PORT")?.unwrap_or(8080);
        let env_ttl = parse_var(&var, "PRESIGNED_URL_TTL_SECS")?.unwrap_or(DEFAULT_URL_TTL.as_secs());
        let env_timeout = parse_var(&var, "STORE_TIMEOUT_SECS")?.unwrap_or(30);
        let env_max_upload = parse_var(&var, "MAX_UPLOAD_BYTES")?.unwrap_or(32 * 1024 * 1024);

        let cors_raw = args
            .cors_origins
            .or_else(|| var("CORS_ALLOWED_ORIGINS"))
            .unwrap_or_default();
        let cors_origins = cors_raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        let presign_ttl_secs = args.presign_ttl_secs.unwrap_or(env_ttl);
        if presign_ttl_secs == 0 {
            bail!("presigned URL TTL must be at least one second");
        }

        Ok(Self {
            host: args
                .host
                .or_else(|| var("CATALOG_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or_else(|| var("CATALOG_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/catalog.db".into()),
            bucket: args
                .bucket
                .or_else(|| var("BUCKET_NAME"))
                .unwrap_or_else(|| "images".into()),
            upload_dir: args
                .upload_dir
                .or_else(|| var("UPLOAD_DIR"))
                .unwrap_or_else(|| "uploads/".into()),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| var("MINIO_ENDPOINT"))
                .unwrap_or_else(|| "http://localhost:9000".into()),
            s3_region: args
                .s3_region
                .or_else(|| var("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            access_key,
            secret_key,
            presign_ttl: Duration::from_secs(presign_ttl_secs),
            store_timeout: Duration::from_secs(args.store_timeout_secs.unwrap_or(env_timeout)),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            cors_origins,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy safe to log: the secret key is masked.
    pub fn redacted(&self) -> Self {
        Self {
            secret_key: "***".into(),
            ..self.clone()
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            operation_timeout: self.store_timeout,
        }
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            bucket: self.bucket.clone(),
            upload_dir: self.upload_dir.clone(),
            url_ttl: self.presign_ttl,
        }
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}
