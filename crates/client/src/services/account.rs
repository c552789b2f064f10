//! Account operations on top of the identity provider.
//!
//! Thin wrappers that validate input, attach the right redirect URLs to
//! emailed links, and keep the cache consistent with sign-out.

use std::sync::Arc;

use tracing::{error, info, instrument};
use url::Url;

use grocer_core::Email;

use crate::cache::LocalCache;
use crate::identity::{ActionCodeInfo, AuthError, AuthUser, IdentityProvider};

/// Redirect targets embedded in emailed links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueUrls {
    /// Where a verification link lands after the address is verified.
    pub verify_email: Url,
    /// Where a password-reset link lands after the password is changed.
    pub password_reset: Url,
}

impl ContinueUrls {
    /// Verification returns to the app origin, password reset to its `/login` page.
    #[must_use]
    pub fn from_origin(origin: &Url) -> Self {
        Self {
            verify_email: origin.clone(),
            password_reset: origin.join("/login").unwrap_or_else(|_| origin.clone()),
        }
    }
}

/// Account operations for the signed-in (or signing-in) user.
pub struct AccountService<P> {
    identity: Arc<P>,
    cache: LocalCache,
    urls: ContinueUrls,
}

impl<P: IdentityProvider> AccountService<P> {
    /// Create an account service.
    #[must_use]
    pub const fn new(identity: Arc<P>, cache: LocalCache, urls: ContinueUrls) -> Self {
        Self {
            identity,
            cache,
            urls,
        }
    }

    fn require_user(&self) -> Result<AuthUser, AuthError> {
        self.identity.current_user().ok_or(AuthError::NoCurrentUser)
    }

    /// Register a new account with email and password. The new account is signed in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address, otherwise
    /// whatever the provider rejects the registration with.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        self.identity.create_account(&email, password).await
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address and
    /// `AuthError::InvalidCredentials` for a wrong email/password pair.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        self.identity.sign_in(&email, password).await
    }

    /// Clear the cache and sign out.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if signing out fails; the cache is
    /// cleared regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.cache.clear();
        self.identity.sign_out().await
    }

    /// Email a verification link to the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoCurrentUser` if nobody is signed in.
    pub async fn send_email_verification(&self) -> Result<(), AuthError> {
        self.require_user()?;
        self.identity
            .send_email_verification(&self.urls.verify_email)
            .await
    }

    /// Resend the verification email and return the message to show the user.
    pub async fn resend_verification_email(&self) -> &'static str {
        match self.send_email_verification().await {
            Ok(()) => "Verification email sent! Please check your inbox.",
            Err(e) => {
                error!(error = %e, "Error resending verification email");
                "Error sending verification email. Please try again."
            }
        }
    }

    /// Email a password-reset link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address, otherwise
    /// the provider's error.
    #[instrument(skip(self))]
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.identity
            .send_password_reset(&email, &self.urls.password_reset)
            .await
    }

    /// Change the signed-in user's email and send a verification link to the new address.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoCurrentUser` if nobody is signed in,
    /// `AuthError::InvalidEmail` for a malformed address, otherwise the
    /// provider's error.
    #[instrument(skip(self))]
    pub async fn update_email(&self, new_email: &str) -> Result<(), AuthError> {
        self.require_user()?;
        let new_email = Email::parse(new_email)?;
        self.identity.update_email(&new_email).await?;
        info!("Email changed, sending verification to new address");
        self.identity
            .send_email_verification(&self.urls.verify_email)
            .await
    }

    /// Apply an email-verification action code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidActionCode` if the code is invalid or expired.
    pub async fn verify_email_action_code(&self, code: &str) -> Result<(), AuthError> {
        self.identity.apply_action_code(code).await
    }

    /// Inspect an action code without applying it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidActionCode` if the code is invalid or expired.
    pub async fn check_action_code(&self, code: &str) -> Result<ActionCodeInfo, AuthError> {
        self.identity.check_action_code(code).await
    }
}
