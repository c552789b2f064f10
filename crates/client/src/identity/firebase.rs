//! Firebase Authentication client over the Identity Toolkit REST API.
//!
//! The session (ID token and signed-in user) is held in memory only. Every
//! sign-in, sign-out or change of the signed-in user's profile is published
//! to subscribers.

use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use grocer_core::{Email, UserId};

use super::{
    ActionCodeInfo, ActionCodeOperation, AuthError, AuthState, AuthStatePublisher,
    AuthSubscription, AuthUser, IdentityProvider,
};
use crate::config::FirebaseConfig;
use crate::remote::TokenSource;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

struct Session {
    id_token: SecretString,
    user: AuthUser,
}

/// Response of `accounts:signUp`, `accounts:signInWithPassword` and
/// `accounts:update` with `returnSecureToken`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: Option<String>,
    local_id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionCodeResponse {
    email: Option<String>,
    request_type: Option<String>,
}

/// Client for Firebase Authentication.
pub struct FirebaseAuthClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    session: RwLock<Option<Session>>,
    state: AuthStatePublisher,
}

impl std::fmt::Debug for FirebaseAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuthClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

impl FirebaseAuthClient {
    /// Create a signed-out client for the project.
    #[must_use]
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: IDENTITY_TOOLKIT_URL.to_string(),
            api_key: config.api_key.clone(),
            session: RwLock::new(None),
            state: AuthStatePublisher::new(),
        }
    }

    /// Call `accounts:{method}` with a JSON body.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, AuthError> {
        let mut url = Url::parse(&format!("{}/accounts:{method}", self.endpoint))
            .map_err(|e| AuthError::Provider(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(method, status = %status, message = %message, "Identity Toolkit call failed");
            return Err(AuthError::from_provider_message(&message));
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn id_token_or_err(&self) -> Result<SecretString, AuthError> {
        self.id_token().ok_or(AuthError::NoCurrentUser)
    }

    /// Look up the profile behind `id_token`.
    async fn lookup(&self, id_token: &SecretString) -> Result<AuthUser, AuthError> {
        let response: LookupResponse = self
            .call("lookup", &json!({ "idToken": id_token.expose_secret() }))
            .await?;
        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Provider("USER_NOT_FOUND".to_string()))?;

        Ok(AuthUser {
            uid: UserId::new(user.local_id),
            email: user.email.as_deref().and_then(|e| Email::parse(e).ok()),
            email_verified: user.email_verified,
        })
    }

    /// Store a new session after a token-issuing call and publish it.
    async fn establish(&self, response: TokenResponse) -> Result<AuthUser, AuthError> {
        let id_token = SecretString::from(
            response
                .id_token
                .ok_or_else(|| AuthError::Provider("response without idToken".to_string()))?,
        );

        let user = match self.lookup(&id_token).await {
            Ok(user) => user,
            Err(e) => {
                // The token is good; only the verified flag is unknown.
                warn!(error = %e, "Account lookup failed after sign-in");
                AuthUser {
                    uid: UserId::new(response.local_id),
                    email: response.email.as_deref().and_then(|e| Email::parse(e).ok()),
                    email_verified: false,
                }
            }
        };

        self.replace_session(Some(Session {
            id_token,
            user: user.clone(),
        }));
        Ok(user)
    }

    fn replace_session(&self, session: Option<Session>) {
        let state = session
            .as_ref()
            .map_or(AuthState::Anonymous, |s| AuthState::Authenticated(s.user.clone()));
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
        self.state.publish(state);
    }

    /// Re-read the signed-in user's profile and publish it if it changed.
    async fn refresh_current_user(&self) {
        let Some(id_token) = self.id_token() else {
            return;
        };
        match self.lookup(&id_token).await {
            Ok(user) => self.replace_session(Some(Session { id_token, user })),
            Err(e) => warn!(error = %e, "Failed to refresh signed-in user"),
        }
    }
}

impl TokenSource for FirebaseAuthClient {
    fn id_token(&self) -> Option<SecretString> {
        self.session
            .read()
            .ok()?
            .as_ref()
            .map(|session| session.id_token.clone())
    }
}

impl IdentityProvider for FirebaseAuthClient {
    fn subscribe(&self) -> AuthSubscription {
        self.state.subscribe()
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.current().user().cloned()
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn create_account(&self, email: &Email, password: &str) -> Result<AuthUser, AuthError> {
        let response: TokenResponse = self
            .call(
                "signUp",
                &json!({ "email": email.as_str(), "password": password, "returnSecureToken": true }),
            )
            .await?;
        let user = self.establish(response).await?;
        info!(uid = %user.uid, "Account created");
        Ok(user)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthUser, AuthError> {
        let response: TokenResponse = self
            .call(
                "signInWithPassword",
                &json!({ "email": email.as_str(), "password": password, "returnSecureToken": true }),
            )
            .await?;
        let user = self.establish(response).await?;
        info!(uid = %user.uid, "Signed in");
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.replace_session(None);
        debug!("Signed out");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn send_email_verification(&self, continue_url: &Url) -> Result<(), AuthError> {
        let id_token = self.id_token_or_err()?;
        let _: Value = self
            .call(
                "sendOobCode",
                &json!({
                    "requestType": "VERIFY_EMAIL",
                    "idToken": id_token.expose_secret(),
                    "continueUrl": continue_url.as_str(),
                    "canHandleCodeInApp": true,
                }),
            )
            .await?;
        info!("Verification email sent");
        Ok(())
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn send_password_reset(&self, email: &Email, continue_url: &Url) -> Result<(), AuthError> {
        let _: Value = self
            .call(
                "sendOobCode",
                &json!({
                    "requestType": "PASSWORD_RESET",
                    "email": email.as_str(),
                    "continueUrl": continue_url.as_str(),
                    "canHandleCodeInApp": false,
                }),
            )
            .await?;
        info!("Password reset email sent");
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn apply_action_code(&self, code: &str) -> Result<(), AuthError> {
        let _: Value = self.call("update", &json!({ "oobCode": code })).await?;
        info!("Action code applied");
        // A verified email changes the signed-in user's profile.
        self.refresh_current_user().await;
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn check_action_code(&self, code: &str) -> Result<ActionCodeInfo, AuthError> {
        let response: ActionCodeResponse = self
            .call("resetPassword", &json!({ "oobCode": code }))
            .await?;
        Ok(ActionCodeInfo {
            operation: response.request_type.as_deref().map_or(
                ActionCodeOperation::Other(String::new()),
                ActionCodeOperation::from_request_type,
            ),
            email: response.email,
        })
    }

    #[instrument(skip(self), fields(new_email = %new_email))]
    async fn update_email(&self, new_email: &Email) -> Result<(), AuthError> {
        let id_token = self.id_token_or_err()?;
        let response: TokenResponse = self
            .call(
                "update",
                &json!({
                    "idToken": id_token.expose_secret(),
                    "email": new_email.as_str(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        self.establish(response).await?;
        info!("Email updated");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> FirebaseAuthClient {
        FirebaseAuthClient::new(&FirebaseConfig {
            api_key: SecretString::from("test-key"),
            project_id: "grocer-test".to_string(),
        })
    }

    #[tokio::test]
    async fn test_operations_without_user_fail() {
        let client = client();
        let url = Url::parse("https://shop.example.com").unwrap();

        assert!(matches!(
            client.send_email_verification(&url).await,
            Err(AuthError::NoCurrentUser)
        ));
        assert!(matches!(
            client.update_email(&Email::parse("new@example.com").unwrap()).await,
            Err(AuthError::NoCurrentUser)
        ));
    }

    #[tokio::test]
    async fn test_session_replacement_publishes_state() {
        let client = client();
        let mut subscription = client.subscribe();
        assert_eq!(subscription.next().await, Some(AuthState::Anonymous));

        let user = AuthUser {
            uid: UserId::new("u1"),
            email: None,
            email_verified: false,
        };
        client.replace_session(Some(Session {
            id_token: SecretString::from("token"),
            user: user.clone(),
        }));
        assert_eq!(subscription.next().await, Some(AuthState::Authenticated(user)));
        assert_eq!(client.id_token().unwrap().expose_secret(), "token");

        client.sign_out().await.unwrap();
        assert_eq!(subscription.next().await, Some(AuthState::Anonymous));
        assert!(client.current_user().is_none());
        assert!(client.id_token().is_none());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let output = format!("{:?}", client());
        assert!(!output.contains("test-key"));
    }
}
