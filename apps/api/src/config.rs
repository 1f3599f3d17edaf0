use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Credentials and name for one bucket. The two buckets are provisioned separately.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub name: String,
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl BucketConfig {
    fn from_env(prefix: &str) -> Result<Self> {
        Ok(BucketConfig {
            name: require_env(&format!("{prefix}_BUCKET"))?,
            access_key_id: require_env(&format!("{prefix}_ACCESS_KEY_ID"))?,
            access_key_secret: require_env(&format!("{prefix}_ACCESS_KEY_SECRET"))?,
        })
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bucket_endpoint: String,
    pub bucket_region: String,
    pub resumes_bucket: BucketConfig,
    pub previews_bucket: BucketConfig,
    pub port: u16,
    pub rust_log: String,
    /// Allowed CORS origin. Permissive when unset.
    pub app_url: Option<String>,
    pub pdf_parse_timeout: Duration,
    pub upload_confirm_timeout: Duration,
    pub pdftoppm_bin: String,
    pub preview_width_px: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            bucket_endpoint: require_env("BUCKET_ENDPOINT")?,
            bucket_region: require_env("BUCKET_REGION")?,
            resumes_bucket: BucketConfig::from_env("RESUMES")?,
            previews_bucket: BucketConfig::from_env("PREVIEWS")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            app_url: std::env::var("APP_URL").ok().filter(|v| !v.trim().is_empty()),
            pdf_parse_timeout: Duration::from_millis(env_or("PDF_PARSE_TIMEOUT_MS", 750)?),
            upload_confirm_timeout: Duration::from_millis(env_or(
                "UPLOAD_CONFIRM_TIMEOUT_MS",
                2000,
            )?),
            pdftoppm_bin: std::env::var("PDFTOPPM_BIN").unwrap_or_else(|_| "pdftoppm".to_string()),
            preview_width_px: env_or("PREVIEW_WIDTH_PX", 800)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parse an optional variable, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
