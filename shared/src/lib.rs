pub mod auth;
pub mod config;
pub mod responses;

use std::sync::Arc;

use analysis_block::{ImageStore, ImageStoreClient, LocalImageStore, RemoteImageStore};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use lambda_http::http::HeaderMap;
use wastelens_atoms::detections::MockDetector;
use wastelens_atoms::users::{IdentityProvider, Session};

pub use auth::CognitoIdentity;
pub use config::{AppConfig, ConfigError, StoreBackend};

/// Clients built once per cold start and shared by every request.
pub struct AppState {
    pub config: AppConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub images: ImageStoreClient,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> Self {
        let aws_config = aws_config::load_from_env().await;
        let cognito_client = CognitoClient::new(&aws_config);

        let store: Arc<dyn ImageStore> = match config.store_backend {
            StoreBackend::Remote => Arc::new(RemoteImageStore::new(
                DynamoClient::new(&aws_config),
                S3Client::new(&aws_config),
                config.table_name.clone(),
                config.bucket_name.clone(),
                config.media_base_url.clone(),
            )),
            StoreBackend::Local => Arc::new(LocalImageStore::new(config.local_store_dir.clone())),
        };
        tracing::info!("Image store backend: {:?}", config.store_backend);

        let identity = Arc::new(CognitoIdentity::new(
            cognito_client,
            config.cognito_client_id.clone(),
            config.cognito_client_secret.clone(),
        ));

        Self {
            images: ImageStoreClient::new(store, Arc::new(MockDetector::default())),
            identity,
            config,
        }
    }

    /// A session for one request, carrying whatever token the request presented.
    pub fn session_for(&self, headers: &HeaderMap) -> Session {
        match auth::access_token_from_headers(headers) {
            Some(token) => Session::with_access_token(self.identity.clone(), &token),
            None => Session::new(self.identity.clone()),
        }
    }
}
