//! Handling of emailed action links.
//!
//! Links sent by the identity provider land on the app with two query
//! parameters: `mode` (what the link is for) and `oobCode` (the one-time
//! action code). A verification link is applied immediately. A password-reset
//! link only stashes its code in storage for the reset-password page to
//! consume.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument};
use url::Url;

use crate::identity::{AuthError, IdentityProvider};
use crate::storage::{Storage, StorageError};

/// Storage key of the pending password-reset code.
pub const RESET_CODE_KEY: &str = "resetCode";

const MODE_PARAM: &str = "mode";
const CODE_PARAM: &str = "oobCode";

/// Errors that can occur while handling an action link.
#[derive(Debug, Error)]
pub enum EmailActionError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EmailActionError {
    /// Message suitable for showing to the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Auth(_) => "Error verifying email. The link may have expired.",
            Self::Storage(_) => "Error saving the reset link. Please try again.",
        }
    }
}

/// What an action link is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailActionMode {
    VerifyEmail,
    ResetPassword,
    Other(String),
}

impl EmailActionMode {
    /// Parse the `mode` query parameter.
    #[must_use]
    pub fn from_param(mode: &str) -> Self {
        match mode {
            "verifyEmail" => Self::VerifyEmail,
            "resetPassword" => Self::ResetPassword,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EmailActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifyEmail => f.write_str("verifyEmail"),
            Self::ResetPassword => f.write_str("resetPassword"),
            Self::Other(mode) => f.write_str(mode),
        }
    }
}

/// An action link's parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailAction {
    pub mode: EmailActionMode,
    pub code: String,
}

impl fmt::Debug for EmailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailAction")
            .field("mode", &self.mode)
            .field("code", &"[REDACTED]")
            .finish()
    }
}

impl EmailAction {
    /// Read `mode` and `oobCode` from a link. Returns `None` unless both are
    /// present and non-empty.
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut mode = None;
        let mut code = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                MODE_PARAM => mode = Some(value.into_owned()),
                CODE_PARAM => code = Some(value.into_owned()),
                _ => {}
            }
        }

        let mode = mode.filter(|m| !m.is_empty())?;
        let code = code.filter(|c| !c.is_empty())?;
        Some(Self {
            mode: EmailActionMode::from_param(&mode),
            code,
        })
    }
}

/// Result of a handled action link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The email address was verified.
    EmailVerified { redirect: &'static str },
    /// The reset code was stored; the user still has to choose a new password.
    PasswordResetPending { redirect: &'static str },
}

impl ActionOutcome {
    /// Path the app should navigate to.
    #[must_use]
    pub const fn redirect(&self) -> &'static str {
        match self {
            Self::EmailVerified { redirect } | Self::PasswordResetPending { redirect } => redirect,
        }
    }

    /// Message suitable for showing to the user, if any.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        match self {
            Self::EmailVerified { .. } => Some("Email verified successfully! You can now log in."),
            Self::PasswordResetPending { .. } => None,
        }
    }
}

/// Handles action links against an identity provider.
pub struct EmailActionHandler<P> {
    identity: Arc<P>,
    storage: Arc<dyn Storage>,
}

impl<P: IdentityProvider> EmailActionHandler<P> {
    #[must_use]
    pub fn new(identity: Arc<P>, storage: Arc<dyn Storage>) -> Self {
        Self { identity, storage }
    }

    /// Handle the action link `url`, if it is one.
    ///
    /// Returns `Ok(None)` for URLs without both parameters and for unknown
    /// modes.
    ///
    /// # Errors
    ///
    /// Returns `EmailActionError::Auth` if a verification code is rejected and
    /// `EmailActionError::Storage` if a reset code cannot be stored.
    #[instrument(skip(self, url))]
    pub async fn handle(&self, url: &Url) -> Result<Option<ActionOutcome>, EmailActionError> {
        let Some(action) = EmailAction::from_url(url) else {
            return Ok(None);
        };
        self.handle_action(action).await
    }

    /// Handle already-parsed link parameters.
    ///
    /// # Errors
    ///
    /// See [`EmailActionHandler::handle`].
    pub async fn handle_action(
        &self,
        action: EmailAction,
    ) -> Result<Option<ActionOutcome>, EmailActionError> {
        match action.mode {
            EmailActionMode::VerifyEmail => {
                self.identity
                    .apply_action_code(&action.code)
                    .await
                    .inspect_err(|e| error!(error = %e, "Error verifying email"))?;
                info!("Email verified");
                Ok(Some(ActionOutcome::EmailVerified { redirect: "/login" }))
            }
            EmailActionMode::ResetPassword => {
                self.storage.set_item(RESET_CODE_KEY, &action.code)?;
                info!("Password reset code stored");
                Ok(Some(ActionOutcome::PasswordResetPending {
                    redirect: "/reset-password",
                }))
            }
            EmailActionMode::Other(mode) => {
                info!(mode = %mode, "Unknown email action mode");
                Ok(None)
            }
        }
    }

    /// The stored password-reset code, if any.
    #[must_use]
    pub fn pending_reset_code(&self) -> Option<String> {
        self.storage.get_item(RESET_CODE_KEY)
    }

    /// Remove and return the stored password-reset code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code could not be removed from storage.
    pub fn take_reset_code(&self) -> Result<Option<String>, StorageError> {
        let code = self.pending_reset_code();
        if code.is_some() {
            self.storage.remove_item(RESET_CODE_KEY)?;
        }
        Ok(code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(query: &str) -> Url {
        Url::parse(&format!("https://shop.example.com/auth/action{query}")).unwrap()
    }

    #[test]
    fn test_from_url() {
        let action = EmailAction::from_url(&url("?mode=verifyEmail&oobCode=abc123&lang=en")).unwrap();
        assert_eq!(action.mode, EmailActionMode::VerifyEmail);
        assert_eq!(action.code, "abc123");

        let action = EmailAction::from_url(&url("?oobCode=xyz&mode=resetPassword")).unwrap();
        assert_eq!(action.mode, EmailActionMode::ResetPassword);
    }

    #[test]
    fn test_from_url_requires_both_params() {
        assert!(EmailAction::from_url(&url("")).is_none());
        assert!(EmailAction::from_url(&url("?mode=verifyEmail")).is_none());
        assert!(EmailAction::from_url(&url("?oobCode=abc")).is_none());
        assert!(EmailAction::from_url(&url("?mode=&oobCode=abc")).is_none());
    }

    #[test]
    fn test_unknown_mode_is_kept() {
        let action = EmailAction::from_url(&url("?mode=recoverEmail&oobCode=abc")).unwrap();
        assert_eq!(action.mode, EmailActionMode::Other("recoverEmail".to_string()));
        assert_eq!(action.mode.to_string(), "recoverEmail");
    }

    #[test]
    fn test_debug_redacts_code() {
        let action = EmailAction::from_url(&url("?mode=verifyEmail&oobCode=secret-code")).unwrap();
        assert!(!format!("{action:?}").contains("secret-code"));
    }

    #[test]
    fn test_outcome_redirects() {
        let verified = ActionOutcome::EmailVerified { redirect: "/login" };
        assert_eq!(verified.redirect(), "/login");
        assert!(verified.message().is_some());

        let pending = ActionOutcome::PasswordResetPending {
            redirect: "/reset-password",
        };
        assert_eq!(pending.redirect(), "/reset-password");
        assert!(pending.message().is_none());
    }
}
