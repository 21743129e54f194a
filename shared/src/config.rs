use std::path::PathBuf;

use analysis_block::UploadLimits;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// DynamoDB rows plus S3 binaries.
    Remote,
    /// One JSON document on local disk.
    Local,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub table_name: String,
    pub bucket_name: String,
    pub media_base_url: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub store_backend: StoreBackend,
    pub local_store_dir: PathBuf,
    pub upload_limits: UploadLimits,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let bucket_name = var("S3_BUCKET_NAME").unwrap_or_else(|| "wastelens-media".to_string());
        let media_base_url = var("MEDIA_BASE_URL")
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", bucket_name));

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("remote") => StoreBackend::Remote,
            Some("local") => StoreBackend::Local,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let upload_limits = match var("MAX_UPLOAD_BYTES") {
            None => UploadLimits::default(),
            Some(raw) => UploadLimits {
                max_bytes: raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "MAX_UPLOAD_BYTES",
                    value: raw.clone(),
                })?,
            },
        };

        let cors_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]);

        Ok(Self {
            table_name: var("TABLE_NAME").unwrap_or_else(|| "wastelens".to_string()),
            bucket_name,
            media_base_url,
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            store_backend,
            local_store_dir: var("LOCAL_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./wastelens-data")),
            upload_limits,
            cors_origins,
        })
    }

    /// Echo the request origin when allowed, else the first configured origin.
    pub fn cors_origin(&self, request_origin: Option<&str>) -> String {
        match request_origin {
            Some(origin) if self.cors_origins.iter().any(|o| o == origin || o == "*") => {
                origin.to_string()
            }
            _ => self
                .cors_origins
                .first()
                .cloned()
                .unwrap_or_else(|| "*".to_string()),
        }
    }
}
