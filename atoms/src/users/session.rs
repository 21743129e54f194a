use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use super::model::{Principal, SessionTokens, SignUpOutcome};
use crate::error::AuthError;

const EVENT_CAPACITY: usize = 16;

/// The hosted identity service, seen from the gate.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the principal behind an access token.
    /// `Ok(None)` means the token is expired, revoked or unknown.
    async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, AuthError>;

    async fn sign_in(&self, username: &str, password: &str) -> Result<SessionTokens, AuthError>;

    async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Principal),
    SignedUp { username: String, confirmed: bool },
    SignedOut,
    /// The provider stopped recognising the token this session held.
    Expired,
}

/// Explicit session passed by reference into every store operation.
///
/// The principal is never cached: each call to [`Session::current_principal`]
/// goes back to the provider, since tokens can be revoked at any time.
pub struct Session {
    provider: Arc<dyn IdentityProvider>,
    tokens: RwLock<Option<SessionTokens>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::build(provider, None)
    }

    /// Session for a request that already carries an access token.
    pub fn with_access_token(provider: Arc<dyn IdentityProvider>, access_token: &str) -> Self {
        let tokens = SessionTokens {
            access_token: access_token.to_string(),
            id_token: None,
            refresh_token: None,
            expires_in: 0,
        };
        Self::build(provider, Some(tokens))
    }

    fn build(provider: Arc<dyn IdentityProvider>, tokens: Option<SessionTokens>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            tokens: RwLock::new(tokens),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().await.clone()
    }

    /// The gate. Resolves the principal afresh on every call.
    pub async fn current_principal(&self) -> Result<Option<Principal>, AuthError> {
        let Some(access_token) = self.tokens.read().await.as_ref().map(|t| t.access_token.clone())
        else {
            return Ok(None);
        };

        match self.provider.current_principal(&access_token).await? {
            Some(principal) => Ok(Some(principal)),
            None => {
                tracing::info!("Session token no longer valid, clearing session");
                self.clear_if_current(&access_token).await;
                self.notify(SessionEvent::Expired);
                Ok(None)
            }
        }
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let tokens = self.provider.sign_in(username, password).await?;
        let principal = self
            .provider
            .current_principal(&tokens.access_token)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        *self.tokens.write().await = Some(tokens);
        tracing::info!("Signed in: user_id={}", principal.id);
        self.notify(SessionEvent::SignedIn(principal.clone()));
        Ok(principal)
    }

    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let outcome = self.provider.sign_up(username, email, password).await?;
        self.notify(SessionEvent::SignedUp {
            username: outcome.username.clone(),
            confirmed: outcome.confirmed,
        });
        Ok(outcome)
    }

    /// Revokes the held token remotely and forgets it locally.
    /// The local session is cleared even if the remote revoke fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let tokens = self.tokens.write().await.take();
        let result = match tokens {
            Some(tokens) => self.provider.sign_out(&tokens.access_token).await,
            None => Ok(()),
        };
        self.notify(SessionEvent::SignedOut);
        result
    }

    async fn clear_if_current(&self, access_token: &str) {
        let mut slot = self.tokens.write().await;
        if slot.as_ref().map(|t| t.access_token.as_str()) == Some(access_token) {
            *slot = None;
        }
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
