use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

use crate::config::AuthConfig;
use crate::error::ConfigError;

const SERVICE: &str = "mailfeed";

/// Save an account password or access token into the OS keyring
pub fn save_account_secret(account_name: &str, secret: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, account_name);
    entry?
        .set_password(secret)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load an account secret from the keyring, `None` when nothing is stored
pub fn load_account_secret(account_name: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, account_name);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// The configured password wins; otherwise the keyring entry for the account.
pub fn resolve_account_secret(account_name: &str, auth: &AuthConfig) -> Result<String, ConfigError> {
    if let Some(password) = &auth.password {
        return Ok(password.clone());
    }
    match load_account_secret(account_name) {
        Ok(Some(secret)) => Ok(secret),
        Ok(None) => Err(ConfigError::MissingCredentials(account_name.to_string())),
        Err(e) => {
            log::error!("Keyring lookup for account '{account_name}' failed: {e}");
            Err(ConfigError::MissingCredentials(account_name.to_string()))
        }
    }
}
