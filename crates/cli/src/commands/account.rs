//! Account and order commands.
//!
//! Sessions are not persisted: each command signs in, does its work and
//! signs out again, leaving whatever it cached in the storage file.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use grocer_client::identity::{FirebaseAuthClient, IdentityProvider};
use grocer_client::reactor::{AuthReactor, NoticeBoard, ReactorEvent, ReactorHandle};
use grocer_client::remote::FirestoreClient;
use grocer_client::services::{AccountService, EmailActionHandler, PreloadReport, UserDataService};

use super::{CommandError, Context};

const PRELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Clients wired together for one command.
struct Session {
    identity: Arc<FirebaseAuthClient>,
    user_data: Arc<UserDataService<FirestoreClient>>,
    accounts: AccountService<FirebaseAuthClient>,
}

impl Session {
    fn connect(ctx: &Context) -> Result<Self, CommandError> {
        let config = ctx.client_config()?;
        let identity = Arc::new(FirebaseAuthClient::new(&config.firebase));
        let store = FirestoreClient::new(&config.firebase).with_token_source(identity.clone());
        let cache = ctx.cache();
        let user_data = Arc::new(UserDataService::new(store, cache.clone()));
        let accounts = AccountService::new(Arc::clone(&identity), cache, config.continue_urls());
        Ok(Self {
            identity,
            user_data,
            accounts,
        })
    }

    fn start_reactor(&self) -> ReactorHandle {
        AuthReactor::spawn(
            self.identity.subscribe(),
            Arc::clone(&self.user_data),
            Arc::new(NoticeBoard::default()),
        )
    }
}

/// Create an account.
pub async fn sign_up(ctx: &Context, email: &str, password: &str) -> Result<(), CommandError> {
    let session = Session::connect(ctx)?;
    let user = session.accounts.sign_up(email, password).await?;
    println!("Account created: {}", user.uid);

    // New accounts start unverified.
    session.accounts.send_email_verification().await?;
    println!("Verification email sent to {email}");
    Ok(())
}

/// Sign in, wait for the background preload and report it.
pub async fn sign_in(
    ctx: &Context,
    email: &str,
    password: &str,
    resend_verification: bool,
) -> Result<(), CommandError> {
    let session = Session::connect(ctx)?;
    let mut reactor = session.start_reactor();

    let user = session.accounts.sign_in(email, password).await?;
    println!("Signed in as {}", user.uid);

    let report = wait_for_preload(&mut reactor).await?;
    print_report(&report);

    if !user.email_verified && resend_verification {
        println!("{}", session.accounts.resend_verification_email().await);
    }

    reactor.cancel();
    Ok(())
}

/// Email a password-reset link.
pub async fn reset_password(ctx: &Context, email: &str) -> Result<(), CommandError> {
    let session = Session::connect(ctx)?;
    session.accounts.send_password_reset(email).await?;
    println!("Password reset email sent to {email}");
    Ok(())
}

/// Handle an emailed action link.
pub async fn email_link(ctx: &Context, url: &str) -> Result<(), CommandError> {
    let url = Url::parse(url)?;
    let session = Session::connect(ctx)?;
    let handler = EmailActionHandler::new(session.identity, Arc::clone(&ctx.storage));

    match handler.handle(&url).await? {
        Some(outcome) => {
            if let Some(message) = outcome.message() {
                println!("{message}");
            }
            println!("Continue at {}", outcome.redirect());
        }
        None => println!("Not an action link"),
    }
    Ok(())
}

/// Sign in and list the most recent orders, newest first.
pub async fn orders(ctx: &Context, email: &str, password: &str) -> Result<(), CommandError> {
    let session = Session::connect(ctx)?;
    let mut reactor = session.start_reactor();

    let user = session.accounts.sign_in(email, password).await?;
    // Served from the cache once the preload has landed.
    wait_for_preload(&mut reactor).await?;
    let orders = session.user_data.get_user_orders(&user.uid).await?;

    if orders.is_empty() {
        println!("No orders");
    }
    for order in &orders {
        let placed = order
            .created_at()
            .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        let total = order
            .fields
            .get("total")
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!("{:<24} {:<16} {}", order.id, placed, total);
    }

    reactor.cancel();
    session.accounts.sign_out().await?;
    Ok(())
}

/// Wait for the reactor's preload, printing any notice it puts up.
async fn wait_for_preload(reactor: &mut ReactorHandle) -> Result<PreloadReport, CommandError> {
    let wait = async {
        while let Some(event) = reactor.next_event().await {
            match event {
                ReactorEvent::Preloaded { report, .. } => return Some(report),
                ReactorEvent::NoticeShown => {
                    println!("Your email address is not verified. Check your inbox for the link.");
                }
                ReactorEvent::CacheCleared => {}
            }
        }
        None
    };

    tokio::time::timeout(PRELOAD_TIMEOUT, wait)
        .await
        .ok()
        .flatten()
        .ok_or(CommandError::Timeout("preload"))
}

fn print_report(report: &PreloadReport) {
    for key in &report.loaded {
        println!("  cached  {key}");
    }
    for key in &report.missing {
        println!("  missing {key}");
    }
    for (key, e) in &report.failed {
        println!("  failed  {key}: {e}");
    }
    for key in &report.discarded {
        println!("  dropped {key} (cache cleared)");
    }
}
