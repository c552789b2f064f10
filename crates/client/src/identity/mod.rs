//! Identity provider.
//!
//! [`IdentityProvider`] is the seam for account operations and auth-state
//! notifications; [`FirebaseAuthClient`] implements it over the Identity
//! Toolkit REST API.
//!
//! Auth state is published through a `tokio::sync::watch` channel. A new
//! [`AuthSubscription`] first yields the state current at subscription time,
//! then every later change.

mod error;
mod firebase;

pub use error::AuthError;
pub use firebase::FirebaseAuthClient;

use std::future::Future;

use tokio::sync::watch;
use url::Url;

use grocer_core::{Email, UserId};

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<Email>,
    pub email_verified: bool,
}

/// Authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticated(AuthUser),
}

impl AuthState {
    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }
}

/// What an action code authorizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionCodeOperation {
    VerifyEmail,
    PasswordReset,
    RecoverEmail,
    VerifyAndChangeEmail,
    Other(String),
}

impl ActionCodeOperation {
    /// Parse an Identity Toolkit `requestType`.
    #[must_use]
    pub fn from_request_type(request_type: &str) -> Self {
        match request_type {
            "VERIFY_EMAIL" => Self::VerifyEmail,
            "PASSWORD_RESET" => Self::PasswordReset,
            "RECOVER_EMAIL" => Self::RecoverEmail,
            "VERIFY_AND_CHANGE_EMAIL" => Self::VerifyAndChangeEmail,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Result of inspecting an action code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCodeInfo {
    pub operation: ActionCodeOperation,
    /// Email address the code was issued for.
    pub email: Option<String>,
}

/// Stream of auth-state notifications.
#[derive(Debug, Clone)]
pub struct AuthSubscription {
    receiver: watch::Receiver<AuthState>,
    delivered_initial: bool,
}

impl AuthSubscription {
    /// Wrap a watch receiver.
    #[must_use]
    pub const fn new(receiver: watch::Receiver<AuthState>) -> Self {
        Self {
            receiver,
            delivered_initial: false,
        }
    }

    /// Wait for the next notification.
    ///
    /// The first call returns the state at subscription time immediately.
    /// Returns `None` once the provider has been dropped.
    pub async fn next(&mut self) -> Option<AuthState> {
        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(self.receiver.borrow_and_update().clone());
        }
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Sending half of the auth-state channel, for provider implementations.
#[derive(Debug)]
pub struct AuthStatePublisher {
    sender: watch::Sender<AuthState>,
}

impl Default for AuthStatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStatePublisher {
    /// Start out anonymous.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AuthState::Anonymous);
        Self { sender }
    }

    /// Publish `state`; subscribers are only woken if it differs from the current one.
    pub fn publish(&self, state: AuthState) {
        self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.sender.borrow().clone()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.sender.subscribe())
    }
}

/// A hosted identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to auth-state changes.
    fn subscribe(&self) -> AuthSubscription;

    /// The signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Create an account and sign it in.
    fn create_account(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    /// Sign in with email and password.
    fn sign_in(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    /// Sign out. Signing out while anonymous succeeds.
    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Email a verification link to the signed-in user.
    fn send_email_verification(
        &self,
        continue_url: &Url,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Email a password-reset link.
    fn send_password_reset(
        &self,
        email: &Email,
        continue_url: &Url,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Apply an emailed action code (e.g., verify an email address).
    fn apply_action_code(&self, code: &str) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Inspect an action code without applying it.
    fn check_action_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<ActionCodeInfo, AuthError>> + Send;

    /// Change the signed-in user's email address.
    fn update_email(&self, new_email: &Email) -> impl Future<Output = Result<(), AuthError>> + Send;
}
