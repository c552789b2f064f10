//! Grocer CLI - drive the client library from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Cart (no network, no Firebase settings needed)
//! grocer cart add --id apple --price 1.25 --name "Gala apple"
//! grocer cart show
//! grocer cart set-quantity apple 3
//! grocer cart clear
//!
//! # Cache
//! grocer cache status
//! grocer cache clear
//!
//! # Account (password from --password or GROCER_PASSWORD)
//! grocer account sign-in -e shopper@example.com
//! grocer account reset-password -e shopper@example.com
//! grocer account email-link "https://shop.example.com/?mode=verifyEmail&oobCode=..."
//!
//! # Recent orders
//! grocer orders -e shopper@example.com
//! ```
//!
//! Configuration is read from the environment (see `grocer_client::config`).
//! The cart and cache commands only need the local settings.

#![cfg_attr(not(test), forbid(unsafe_code))]
// Command output goes to stdout.
#![allow(clippy::print_stdout)]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grocer_client::config::LocalConfig;

mod commands;

#[derive(Parser)]
#[command(name = "grocer")]
#[command(author, version, about = "Grocer client tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect or clear the user-data cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Account operations
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Sign in and list the most recent orders
    Orders {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "GROCER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and totals
    Show,
    /// Add one unit of a product
    Add {
        /// Product id
        #[arg(long)]
        id: String,

        /// Unit price (e.g. 1.25)
        #[arg(long)]
        price: Decimal,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a product
    Remove {
        /// Product id
        id: String,
    },
    /// Set the quantity of a product (0 removes it)
    SetQuantity {
        /// Product id
        id: String,

        /// New quantity
        quantity: u32,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show which datasets are cached and whether the cache is valid
    Status,
    /// Remove all cached user data
    Clear,
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create an account
    SignUp {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "GROCER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and preload the account's data into the cache
    SignIn {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "GROCER_PASSWORD", hide_env_values = true)]
        password: String,

        /// Resend the verification email if the address is unverified
        #[arg(long)]
        resend_verification: bool,
    },
    /// Email a password-reset link
    ResetPassword {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Handle an emailed action link (verification or password reset)
    EmailLink {
        /// The full link URL
        url: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &LocalConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration before tracing so Sentry can be set up first
    let config = LocalConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grocer_client=info,grocer_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: LocalConfig) -> Result<(), commands::CommandError> {
    let ctx = commands::Context::open(config)?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx),
            CartAction::Add { id, price, name } => commands::cart::add(&ctx, &id, price, name)?,
            CartAction::Remove { id } => commands::cart::remove(&ctx, &id)?,
            CartAction::SetQuantity { id, quantity } => {
                commands::cart::set_quantity(&ctx, &id, quantity)?;
            }
            CartAction::Clear => commands::cart::clear(&ctx)?,
        },
        Commands::Cache { action } => match action {
            CacheAction::Status => commands::cache::status(&ctx),
            CacheAction::Clear => commands::cache::clear(&ctx),
        },
        Commands::Account { action } => match action {
            AccountAction::SignUp { email, password } => {
                commands::account::sign_up(&ctx, &email, &password).await?;
            }
            AccountAction::SignIn {
                email,
                password,
                resend_verification,
            } => {
                commands::account::sign_in(&ctx, &email, &password, resend_verification).await?;
            }
            AccountAction::ResetPassword { email } => {
                commands::account::reset_password(&ctx, &email).await?;
            }
            AccountAction::EmailLink { url } => commands::account::email_link(&ctx, &url).await?,
        },
        Commands::Orders { email, password } => {
            commands::account::orders(&ctx, &email, &password).await?;
        }
    }
    Ok(())
}
