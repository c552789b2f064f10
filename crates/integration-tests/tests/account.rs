//! Integration tests for account operations and emailed action links.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;
use url::Url;

use grocer_client::cache::CacheKey;
use grocer_client::identity::{ActionCodeOperation, AuthError, IdentityProvider};
use grocer_client::services::{
    AccountService, ActionOutcome, ContinueUrls, EmailActionError, EmailActionHandler,
    RESET_CODE_KEY,
};
use grocer_client::storage::{MemoryStorage, Storage};
use grocer_integration_tests::{FakeIdentity, SentEmail, memory_cache};

const ORIGIN: &str = "https://shop.example.com";

fn accounts(identity: &Arc<FakeIdentity>) -> (AccountService<FakeIdentity>, Arc<MemoryStorage>) {
    let (cache, storage, _) = memory_cache();
    let urls = ContinueUrls::from_origin(&Url::parse(ORIGIN).unwrap());
    (AccountService::new(identity.clone(), cache, urls), storage)
}

fn link(query: &str) -> Url {
    Url::parse(&format!("{ORIGIN}/auth/action?{query}")).unwrap()
}

// =============================================================================
// Account service
// =============================================================================

#[tokio::test]
async fn test_sign_up_validates_email_and_password() {
    let identity = Arc::new(FakeIdentity::new());
    let (service, _) = accounts(&identity);

    assert!(matches!(
        service.sign_up("not-an-email", "long-enough").await,
        Err(AuthError::InvalidEmail(_))
    ));
    assert!(matches!(
        service.sign_up("new@example.com", "123").await,
        Err(AuthError::WeakPassword(_))
    ));

    let user = service.sign_up("new@example.com", "long-enough").await.unwrap();
    assert!(!user.email_verified);
    assert_eq!(identity.current_user(), Some(user));

    assert!(matches!(
        service.sign_up("new@example.com", "long-enough").await,
        Err(AuthError::EmailExists)
    ));
}

#[tokio::test]
async fn test_sign_in_rejects_wrong_password() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_account("ada@example.com", "correct-horse", "u1", true);
    let (service, _) = accounts(&identity);

    assert!(matches!(
        service.sign_in("ada@example.com", "wrong").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(identity.current_user().is_none());

    let user = service.sign_in(" ada@example.com ", "correct-horse").await.unwrap();
    assert_eq!(user.uid.as_str(), "u1");
}

#[tokio::test]
async fn test_sign_out_clears_cache() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_account("ada@example.com", "correct-horse", "u1", true);
    let (cache, storage, _) = memory_cache();
    let urls = ContinueUrls::from_origin(&Url::parse(ORIGIN).unwrap());
    let service = AccountService::new(identity.clone(), cache.clone(), urls);

    service.sign_in("ada@example.com", "correct-horse").await.unwrap();
    cache.set(CacheKey::Orders, &json!({ "uid": "u1", "items": [] }));
    assert!(cache.is_valid());

    service.sign_out().await.unwrap();

    assert!(identity.current_user().is_none());
    assert!(storage.get_item(CacheKey::Orders.storage_key()).is_none());
    assert!(!cache.is_valid());
}

#[tokio::test]
async fn test_verification_requires_a_user() {
    let identity = Arc::new(FakeIdentity::new());
    let (service, _) = accounts(&identity);

    assert!(matches!(
        service.send_email_verification().await,
        Err(AuthError::NoCurrentUser)
    ));
    assert_eq!(
        service.resend_verification_email().await,
        "Error sending verification email. Please try again."
    );
    assert!(identity.sent_emails().is_empty());
}

#[tokio::test]
async fn test_emails_carry_continue_urls() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_account("ada@example.com", "correct-horse", "u1", false);
    let (service, _) = accounts(&identity);

    service.send_password_reset("ada@example.com").await.unwrap();
    service.sign_in("ada@example.com", "correct-horse").await.unwrap();
    assert_eq!(
        service.resend_verification_email().await,
        "Verification email sent! Please check your inbox."
    );

    assert_eq!(
        identity.sent_emails(),
        vec![
            SentEmail::PasswordReset {
                to: "ada@example.com".to_string(),
                continue_url: Url::parse("https://shop.example.com/login").unwrap(),
            },
            SentEmail::Verification {
                to: Some("ada@example.com".to_string()),
                continue_url: Url::parse("https://shop.example.com/").unwrap(),
            },
        ]
    );
}

#[tokio::test]
async fn test_update_email_sends_verification_to_new_address() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_account("ada@example.com", "correct-horse", "u1", true);
    let (service, _) = accounts(&identity);

    assert!(matches!(
        service.update_email("ada@new.example.com").await,
        Err(AuthError::NoCurrentUser)
    ));

    service.sign_in("ada@example.com", "correct-horse").await.unwrap();
    service.update_email("ada@new.example.com").await.unwrap();

    let user = identity.current_user().unwrap();
    assert_eq!(user.email.unwrap().as_str(), "ada@new.example.com");
    assert!(!user.email_verified);
    assert!(matches!(
        identity.sent_emails().last(),
        Some(SentEmail::Verification { to: Some(to), .. }) if to == "ada@new.example.com"
    ));
}

#[tokio::test]
async fn test_check_action_code() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_action_code("reset-1", ActionCodeOperation::PasswordReset);
    let (service, _) = accounts(&identity);

    let info = service.check_action_code("reset-1").await.unwrap();
    assert_eq!(info.operation, ActionCodeOperation::PasswordReset);
    assert!(matches!(
        service.check_action_code("bogus").await,
        Err(AuthError::InvalidActionCode)
    ));
}

// =============================================================================
// Email action links
// =============================================================================

#[tokio::test]
async fn test_verify_email_link() {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_action_code("verify-1", ActionCodeOperation::VerifyEmail);
    let storage = Arc::new(MemoryStorage::new());
    let handler = EmailActionHandler::new(identity.clone(), storage.clone());

    let outcome = handler
        .handle(&link("mode=verifyEmail&oobCode=verify-1"))
        .await
        .unwrap();

    assert_eq!(outcome, Some(ActionOutcome::EmailVerified { redirect: "/login" }));
    assert_eq!(identity.applied_codes(), vec!["verify-1".to_string()]);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_expired_verification_link_fails() {
    let identity = Arc::new(FakeIdentity::new());
    let handler = EmailActionHandler::new(identity, Arc::new(MemoryStorage::new()));

    let error = handler
        .handle(&link("mode=verifyEmail&oobCode=expired"))
        .await
        .unwrap_err();

    assert!(matches!(error, EmailActionError::Auth(AuthError::InvalidActionCode)));
    assert_eq!(
        error.user_message(),
        "Error verifying email. The link may have expired."
    );
}

#[tokio::test]
async fn test_reset_password_link_stores_code() {
    let identity = Arc::new(FakeIdentity::new());
    let storage = Arc::new(MemoryStorage::new());
    let handler = EmailActionHandler::new(identity.clone(), storage.clone());

    let outcome = handler
        .handle(&link("mode=resetPassword&oobCode=reset-1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Some(ActionOutcome::PasswordResetPending {
            redirect: "/reset-password"
        })
    );
    assert_eq!(storage.get_item(RESET_CODE_KEY).as_deref(), Some("reset-1"));
    assert!(identity.applied_codes().is_empty());

    assert_eq!(handler.take_reset_code().unwrap().as_deref(), Some("reset-1"));
    assert!(handler.pending_reset_code().is_none());
}

#[tokio::test]
async fn test_unknown_or_incomplete_links_are_ignored() {
    let identity = Arc::new(FakeIdentity::new());
    let storage = Arc::new(MemoryStorage::new());
    let handler = EmailActionHandler::new(identity.clone(), storage.clone());

    for query in ["mode=recoverEmail&oobCode=abc", "mode=verifyEmail", "oobCode=abc", ""] {
        assert_eq!(handler.handle(&link(query)).await.unwrap(), None, "{query}");
    }
    assert!(identity.applied_codes().is_empty());
    assert!(storage.is_empty());
}
