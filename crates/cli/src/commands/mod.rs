//! Command implementations.

pub mod account;
pub mod cache;
pub mod cart;

use std::sync::Arc;

use thiserror::Error;

use grocer_client::cache::LocalCache;
use grocer_client::config::{ClientConfig, ConfigError, LocalConfig};
use grocer_client::identity::AuthError;
use grocer_client::remote::StoreError;
use grocer_client::services::EmailActionError;
use grocer_client::storage::{FileStorage, Storage, StorageError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("{}", .0.user_message())]
    EmailAction(#[from] EmailActionError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// What every command needs: local settings and the storage file.
///
/// Commands that talk to the backend load the rest of the configuration
/// through [`Context::client_config`], so the cart and cache commands work
/// without any Firebase settings.
pub struct Context {
    pub local: LocalConfig,
    pub storage: Arc<dyn Storage>,
}

impl Context {
    /// Open the storage file named by the configuration.
    pub fn open(local: LocalConfig) -> Result<Self, CommandError> {
        let storage = FileStorage::open(local.storage_path.clone())?;
        Ok(Self {
            local,
            storage: Arc::new(storage),
        })
    }

    /// The user-data cache over this context's storage.
    pub fn cache(&self) -> LocalCache {
        LocalCache::new(Arc::clone(&self.storage)).with_ttl(self.local.cache_ttl)
    }

    /// The full configuration, including the Firebase project.
    pub fn client_config(&self) -> Result<ClientConfig, CommandError> {
        Ok(ClientConfig::with_local(self.local.clone())?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use grocer_client::cart::CART_KEY;

    use super::*;

    fn local(dir: &tempfile::TempDir) -> LocalConfig {
        LocalConfig {
            storage_path: dir.path().join("storage.json"),
            cache_ttl: Duration::from_secs(300),
            sentry_dsn: None,
        }
    }

    #[test]
    fn test_cart_and_cache_commands_run_on_local_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::open(local(&dir)).unwrap();

        cart::add(&ctx, "apple", Decimal::new(125, 2), Some("Gala apple".to_string())).unwrap();
        cart::set_quantity(&ctx, "apple", 3).unwrap();
        cache::clear(&ctx);

        let reopened = Context::open(local(&dir)).unwrap();
        assert!(reopened.storage.get_item(CART_KEY).unwrap().contains("apple"));
        assert!(!reopened.cache().is_valid());
    }
}
