use serde::Deserialize;

use crate::auth::{MAX_COST, MIN_COST};
use crate::error::ConfigError;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub tokens: TokenSettings,
    pub keys: KeySettings,
    pub password: PasswordSettings,
    pub session_store: SessionStoreSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token lifetimes and claim settings
#[derive(Deserialize, Clone, Debug)]
pub struct TokenSettings {
    pub access_token_expiry: i64,  // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64, // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
    /// Embed the PEM public key as a `pk` claim. Informational only.
    #[serde(default)]
    pub embed_public_key: bool,
}

/// Where the RSA signing keypair lives on disk
#[derive(Deserialize, Clone, Debug)]
pub struct KeySettings {
    pub private_key_path: String,
    pub public_key_path: String,
    #[serde(default = "default_key_bits")]
    pub bits: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    /// bcrypt cost factor
    pub cost: u32,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SessionStoreSettings {
    pub backend: StoreBackend,
    pub timeout_milliseconds: u64,
    /// 0 disables the periodic sweep
    #[serde(default)]
    pub sweep_interval_seconds: u64,
}

impl SessionStoreSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }
}

pub const MIN_KEY_BITS: usize = 2048;
/// One year
pub const MAX_TOKEN_EXPIRY_SECONDS: i64 = 365 * 24 * 60 * 60;

fn default_key_bits() -> usize {
    MIN_KEY_BITS
}

impl Settings {
    /// Reject settings the token lifecycle cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tokens = &self.tokens;
        if tokens.access_token_expiry <= 0 || tokens.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if tokens.refresh_token_expiry > MAX_TOKEN_EXPIRY_SECONDS {
            return Err(ConfigError::InvalidValue(format!(
                "token expiries must not exceed {} seconds",
                MAX_TOKEN_EXPIRY_SECONDS
            )));
        }
        if tokens.access_token_expiry >= tokens.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "access_token_expiry must be shorter than refresh_token_expiry".to_string(),
            ));
        }
        if tokens.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.issuer".to_string()));
        }
        if self.keys.bits < MIN_KEY_BITS {
            return Err(ConfigError::InvalidValue(format!(
                "keys.bits must be at least {}",
                MIN_KEY_BITS
            )));
        }
        if !(MIN_COST..=MAX_COST).contains(&self.password.cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password.cost must be within {}..={}",
                MIN_COST,
                MAX_COST
            )));
        }
        if self.session_store.timeout_milliseconds == 0 {
            return Err(ConfigError::InvalidValue(
                "session_store.timeout_milliseconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from an optional `configuration.*` file, overridden by
/// `APP__`-prefixed environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}
