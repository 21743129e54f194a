use thiserror::Error;

/// Failures of an image store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No principal could be resolved; raised before any remote call.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The id is absent or belongs to another principal.
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Processing is one-shot; the image already carries a committed batch.
    #[error("Image already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures surfaced by the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity provider error: {0}")]
    Remote(String),
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials | AuthError::InvalidCredentials => {
                StoreError::Unauthenticated
            }
            AuthError::Remote(msg) => StoreError::Remote(msg),
        }
    }
}
