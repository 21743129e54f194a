use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::http::header::{AUTHORIZATION, COOKIE};
use lambda_http::http::HeaderMap;
use sha2::Sha256;
use wastelens_atoms::users::{IdentityProvider, Principal, SessionTokens, SignUpOutcome};
use wastelens_atoms::AuthError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cognito user pool app client with a secret.
pub struct CognitoIdentity {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
}

impl CognitoIdentity {
    pub fn new(client: CognitoClient, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            client_id,
            client_secret,
        }
    }

    fn secret_hash(&self, username: &str) -> Result<String, AuthError> {
        secret_hash(&self.client_secret, username, &self.client_id)
    }
}

/// `SECRET_HASH` = base64(HMAC-SHA256(client_secret, username + client_id)).
pub fn secret_hash(client_secret: &str, username: &str, client_id: &str) -> Result<String, AuthError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(client_secret.as_bytes())
        .map_err(|e| AuthError::Remote(format!("HMAC key error: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn access_token_cookie(token: &str, max_age_secs: i32) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=None",
        ACCESS_TOKEN_COOKIE, token, max_age_secs
    )
}

pub fn clear_access_token_cookie() -> String {
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=None",
        ACCESS_TOKEN_COOKIE
    )
}

/// Bearer token from `Authorization`, else the `access_token` cookie.
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, AuthError> {
        let result = self.client.get_user().access_token(access_token).send().await;

        let output = match result {
            Ok(output) => output,
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_not_authorized_exception() || e.is_user_not_found_exception()
                }) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(AuthError::Remote(format!("Cognito get_user error: {}", err))),
        };

        let attribute = |name: &str| {
            output
                .user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(|v| v.to_string())
        };

        let username = output.username().to_string();
        Ok(Some(Principal {
            id: attribute("sub").unwrap_or_else(|| username.clone()),
            email: attribute("email").unwrap_or_default(),
            username: attribute("preferred_username").unwrap_or(username),
        }))
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let output = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", self.secret_hash(username)?)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| {
                    e.is_not_authorized_exception() || e.is_user_not_found_exception()
                }) {
                    AuthError::InvalidCredentials
                } else {
                    AuthError::Remote(format!("Cognito initiate_auth error: {}", err))
                }
            })?;

        let Some(auth) = output.authentication_result() else {
            let challenge = output
                .challenge_name()
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::warn!("Sign-in for {} returned challenge {}", username, challenge);
            return Err(AuthError::Remote(format!("Unsupported auth challenge: {}", challenge)));
        };

        let access_token = auth
            .access_token()
            .ok_or_else(|| AuthError::Remote("Cognito returned no access token".to_string()))?;

        Ok(SessionTokens {
            access_token: access_token.to_string(),
            id_token: auth.id_token().map(|t| t.to_string()),
            refresh_token: auth.refresh_token().map(|t| t.to_string()),
            expires_in: auth.expires_in(),
        })
    }

    async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let email_attribute = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| AuthError::Remote(format!("Cognito attribute error: {}", e)))?;

        let output = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .secret_hash(self.secret_hash(username)?)
            .username(username)
            .password(password)
            .user_attributes(email_attribute)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_username_exists_exception()) {
                    AuthError::Remote("Username already exists".to_string())
                } else {
                    AuthError::Remote(format!("Cognito sign_up error: {}", err))
                }
            })?;

        tracing::info!("Signed up {} (confirmed={})", username, output.user_confirmed());

        Ok(SignUpOutcome {
            user_id: output.user_sub().to_string(),
            username: username.to_string(),
            confirmed: output.user_confirmed(),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Remote(format!("Cognito global_sign_out error: {}", e)))?;
        Ok(())
    }
}
