use serde::{Deserialize, Serialize};

/// The authenticated user on whose behalf operations run.
/// Owned by the identity provider; only read here to scope queries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Tokens handed out by the identity provider on sign-in.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOutcome {
    pub user_id: String,
    pub username: String,
    pub confirmed: bool,
}
