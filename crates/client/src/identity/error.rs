//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] grocer_core::EmailError),

    /// The operation needs a signed-in user and there is none.
    #[error("no user logged in")]
    NoCurrentUser,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("an account with this email already exists")]
    EmailExists,

    /// The account has been disabled by an administrator.
    #[error("user account is disabled")]
    UserDisabled,

    /// Password rejected by the provider.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The action code is malformed, already used, or expired.
    #[error("invalid or expired action code")]
    InvalidActionCode,

    /// The operation needs a fresh sign-in.
    #[error("recent sign-in required")]
    RequiresRecentLogin,

    /// Too many attempts; the provider is throttling this client.
    #[error("too many attempts, try again later")]
    TooManyAttempts,

    /// Any other error code returned by the provider.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AuthError {
    /// Map an Identity Toolkit error message to an error.
    ///
    /// Messages look like `WEAK_PASSWORD : Password should be at least 6 characters`;
    /// the part before ` : ` is the code.
    #[must_use]
    pub fn from_provider_message(message: &str) -> Self {
        let (code, detail) = message
            .split_once(" : ")
            .map_or((message.trim(), ""), |(code, detail)| (code.trim(), detail.trim()));

        match code {
            "EMAIL_EXISTS" => Self::EmailExists,
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                Self::InvalidCredentials
            }
            "USER_DISABLED" => Self::UserDisabled,
            "WEAK_PASSWORD" => Self::WeakPassword(if detail.is_empty() {
                "password is too weak".to_string()
            } else {
                detail.to_string()
            }),
            "INVALID_OOB_CODE" | "EXPIRED_OOB_CODE" => Self::InvalidActionCode,
            "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" | "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" => {
                Self::RequiresRecentLogin
            }
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            _ => Self::Provider(message.to_string()),
        }
    }
}
