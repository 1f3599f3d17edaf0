mod config;
mod db;
mod errors;
mod extractors;
mod models;
mod resumes;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use axum::http::HeaderValue;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{BucketConfig, Config};
use crate::db::{create_pool, run_migrations};
use crate::resumes::preview::PdftoppmRenderer;
use crate::resumes::repository::PgResumeRepository;
use crate::resumes::validation::{DocumentValidator, ValidationLimits};
use crate::resumes::ResumeService;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::s3::{PRIVATE_NO_STORE, PUBLIC_IMMUTABLE};
use crate::storage::S3Bucket;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume vault API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // One client per bucket: each bucket has its own credentials
    let documents = S3Bucket::new(
        build_s3_client(&config, &config.resumes_bucket).await,
        &config.resumes_bucket.name,
        config.upload_confirm_timeout,
    )
    .with_cache_control(PRIVATE_NO_STORE);
    let previews = S3Bucket::new(
        build_s3_client(&config, &config.previews_bucket).await,
        &config.previews_bucket.name,
        config.upload_confirm_timeout,
    )
    .with_cache_control(PUBLIC_IMMUTABLE);
    info!(
        documents = %config.resumes_bucket.name,
        previews = %config.previews_bucket.name,
        "S3 clients initialized"
    );

    let validator = DocumentValidator::new(ValidationLimits {
        parse_timeout: config.pdf_parse_timeout,
        ..ValidationLimits::default()
    });
    let renderer = PdftoppmRenderer::new(&config.pdftoppm_bin, config.preview_width_px);

    // Build app state
    let state = AppState {
        resumes: Arc::new(ResumeService::new(
            Arc::new(PgResumeRepository::new(db)),
            Arc::new(documents),
            Arc::new(previews),
            Arc::new(renderer),
            validator,
        )),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.app_url.as_deref())?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for an S3-compatible endpoint with static credentials.
async fn build_s3_client(config: &Config, bucket: &BucketConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &bucket.access_key_id,
        &bucket.access_key_secret,
        None,
        None,
        "resume-vault-static",
    );

    let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.bucket_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.bucket_endpoint)
        .load()
        .await;

    // Path-style addressing: most S3-compatible services reject virtual-host buckets.
    aws_sdk_s3::Client::from_conf(
        aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build(),
    )
}

fn cors_layer(app_url: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = app_url else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("APP_URL '{origin}' is not a valid origin"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}
