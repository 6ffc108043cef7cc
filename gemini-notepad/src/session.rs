//! Who is signed in.
//!
//! Authentication itself belongs to an [`IdentityProvider`]. A [`Session`]
//! wraps one and tracks the lifecycle
//! `Unauthenticated -> Authenticating -> Authenticated -> Unauthenticated`.
//! It is passed explicitly to whatever needs the current user.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        User {
            id: id.into(),
            display_name: None,
            photo_url: None,
            email: None,
        }
    }
}

pub trait IdentityProvider {
    /// The user of a session that outlived the previous run, if any.
    fn restore(&self) -> impl Future<Output = Result<Option<User>, AuthError>> + Send;

    fn sign_in_with_provider(&self) -> impl Future<Output = Result<User, AuthError>> + Send;

    fn sign_up_with_credentials(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<User, AuthError>> + Send;

    fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<User, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated(User),
}

#[derive(Debug)]
pub struct Session<P> {
    provider: Option<P>,
    state: AuthState,
}

impl<P: IdentityProvider> Session<P> {
    /// Starts out loading until [`resume`](Self::resume) hears back.
    pub fn new(provider: P) -> Self {
        Session {
            provider: Some(provider),
            state: AuthState::Authenticating,
        }
    }

    /// A session without an identity provider: nobody is ever signed in
    /// and nothing is loading.
    pub fn disabled() -> Self {
        warn!("identity provider is not configured, sign-in is disabled");
        Session {
            provider: None,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&User> {
        match &self.state {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == AuthState::Authenticating
    }

    pub async fn resume(&mut self) -> Option<&User> {
        let Some(provider) = &self.provider else {
            return None;
        };
        self.state = match provider.restore().await {
            Ok(Some(user)) => {
                info!("resumed session of user \"{}\"", user.id);
                AuthState::Authenticated(user)
            }
            Ok(None) => AuthState::Unauthenticated,
            Err(e) => {
                error!("failed to restore session: {e}");
                AuthState::Unauthenticated
            }
        };
        self.current_user()
    }

    pub async fn sign_in_with_provider(&mut self) -> Result<User, AuthError> {
        let Some(provider) = &self.provider else {
            return Err(not_configured("sign in"));
        };
        self.state = AuthState::Authenticating;
        let result = provider.sign_in_with_provider().await;
        self.settle(result)
    }

    pub async fn sign_up_with_credentials(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let Some(provider) = &self.provider else {
            return Err(not_configured("sign up"));
        };
        self.state = AuthState::Authenticating;
        let result = provider.sign_up_with_credentials(name, email, password).await;
        self.settle(result)
    }

    pub async fn sign_in_with_credentials(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let Some(provider) = &self.provider else {
            return Err(not_configured("sign in"));
        };
        self.state = AuthState::Authenticating;
        let result = provider.sign_in_with_credentials(email, password).await;
        self.settle(result)
    }

    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        let Some(provider) = &self.provider else {
            error!("identity provider is not configured, cannot sign out");
            return Ok(());
        };
        provider.sign_out().await?;
        if let Some(user) = self.current_user() {
            info!("user \"{}\" signed out", user.id);
        }
        self.state = AuthState::Unauthenticated;
        Ok(())
    }

    fn settle(&mut self, result: Result<User, AuthError>) -> Result<User, AuthError> {
        match result {
            Ok(user) => {
                info!("user \"{}\" signed in", user.id);
                self.state = AuthState::Authenticated(user.clone());
                Ok(user)
            }
            Err(e) => {
                warn!("sign-in failed: {e}");
                self.state = AuthState::Unauthenticated;
                Err(e)
            }
        }
    }
}

fn not_configured(what: &str) -> AuthError {
    error!("identity provider is not configured, cannot {what}");
    AuthError::NotConfigured
}

/// Signs in as one fixed local profile; there are no credentials to check.
#[derive(Debug, Clone)]
pub struct LocalProfileProvider {
    profile: User,
}

impl LocalProfileProvider {
    pub fn new(profile: User) -> Self {
        LocalProfileProvider { profile }
    }
}

impl IdentityProvider for LocalProfileProvider {
    async fn restore(&self) -> Result<Option<User>, AuthError> {
        Ok(None)
    }

    async fn sign_in_with_provider(&self) -> Result<User, AuthError> {
        Ok(self.profile.clone())
    }

    async fn sign_up_with_credentials(
        &self,
        _name: &str,
        _email: &str,
        _password: &str,
    ) -> Result<User, AuthError> {
        Err(AuthError::Unsupported("credential sign-up"))
    }

    async fn sign_in_with_credentials(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<User, AuthError> {
        Err(AuthError::Unsupported("credential sign-in"))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
