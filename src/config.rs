//! Gift service configuration
//!
//! Loaded from environment variables (optionally from a `.env` file).

use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::Path;

use crate::types::ChainId;

/// Main configuration for the gift service
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub node: NodeConfig,
    pub custodian: CustodianConfig,
    pub deposits: DepositConfig,
    pub api: ApiConfig,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Ledger node configuration
#[derive(Clone)]
pub struct NodeConfig {
    pub url: String,
    /// Credential the node uses to sign custodial writes
    pub signing_secret: Option<String>,
    /// Chain used for redemption record writes
    pub property_chain: ChainId,
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("url", &self.url)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("property_chain", &self.property_chain)
            .finish()
    }
}

/// Custodial account configuration
#[derive(Clone)]
pub struct CustodianConfig {
    /// Token-signing key (0x + 64 hex chars)
    pub private_key: String,
    /// Expected address of the key; checked at startup when set
    pub address: Option<String>,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for CustodianConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodianConfig")
            .field("private_key", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

impl CustodianConfig {
    /// Raw 32-byte secret
    pub fn secret_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex::decode(self.private_key.trim_start_matches("0x"))
            .wrap_err("custodian private key is not valid hex")?;
        bytes
            .try_into()
            .map_err(|_| eyre!("custodian private key must be 32 bytes"))
    }
}

/// Deposit watcher configuration
#[derive(Debug, Clone)]
pub struct DepositConfig {
    pub watched_chains: Vec<ChainId>,
    pub excluded_chains: Vec<ChainId>,
    /// Chain token messages are delivered on
    pub message_chain: ChainId,
    pub start_height: u64,
    pub poll_interval_ms: u64,
}

/// HTTP API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Default functions
fn default_message_chain() -> u32 {
    2
}

fn default_property_chain() -> u32 {
    2
}

fn default_watched_chains() -> Vec<ChainId> {
    (1..=5).map(ChainId).collect()
}

fn default_excluded_chains() -> Vec<ChainId> {
    vec![ChainId(3)]
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_api_port() -> u16 {
    9092
}

/// Parse a comma separated chain list ("1,2,5")
pub fn parse_chain_list(raw: &str) -> Result<Vec<ChainId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map(ChainId)
                .wrap_err_with(|| format!("Invalid chain id '{}'", s))
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let node = NodeConfig {
            url: env::var("NODE_URL")
                .map_err(|_| eyre!("NODE_URL environment variable is required"))?,
            signing_secret: env::var("NODE_SIGNING_SECRET").ok(),
            property_chain: ChainId(
                env::var("PROPERTY_CHAIN_ID")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default_property_chain()),
            ),
        };

        let custodian = CustodianConfig {
            private_key: env::var("CUSTODIAN_PRIVATE_KEY")
                .map_err(|_| eyre!("CUSTODIAN_PRIVATE_KEY environment variable is required"))?,
            address: env::var("CUSTODIAN_ADDRESS").ok(),
        };

        let deposits = DepositConfig {
            watched_chains: match env::var("WATCHED_CHAINS") {
                Ok(raw) => parse_chain_list(&raw).wrap_err("WATCHED_CHAINS is invalid")?,
                Err(_) => default_watched_chains(),
            },
            excluded_chains: match env::var("EXCLUDED_CHAINS") {
                Ok(raw) => parse_chain_list(&raw).wrap_err("EXCLUDED_CHAINS is invalid")?,
                Err(_) => default_excluded_chains(),
            },
            message_chain: ChainId(
                env::var("MESSAGE_CHAIN_ID")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default_message_chain()),
            ),
            start_height: env::var("START_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_poll_interval()),
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_api_port()),
        };

        let config = Config {
            database,
            node,
            custodian,
            deposits,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.node.url.is_empty() {
            return Err(eyre!("node.url cannot be empty"));
        }

        if !self.node.property_chain.is_gift_chain() {
            return Err(eyre!(
                "node.property_chain must be between 1 and 5, got {}",
                self.node.property_chain
            ));
        }

        let key = &self.custodian.private_key;
        if key.len() != 66 || !key.starts_with("0x") {
            return Err(eyre!(
                "custodian.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }
        self.custodian.secret_bytes()?;

        if self.deposits.watched_chains.is_empty() {
            return Err(eyre!("deposits.watched_chains cannot be empty"));
        }

        for chain in self
            .deposits
            .watched_chains
            .iter()
            .chain(self.deposits.excluded_chains.iter())
        {
            if !chain.is_gift_chain() {
                return Err(eyre!("chain {} is outside the gift range 1..=5", chain));
            }
        }

        if !self.deposits.message_chain.is_gift_chain() {
            return Err(eyre!(
                "deposits.message_chain must be between 1 and 5, got {}",
                self.deposits.message_chain
            ));
        }

        if self.api.port == 0 {
            return Err(eyre!("api.port cannot be 0"));
        }

        Ok(())
    }
}
