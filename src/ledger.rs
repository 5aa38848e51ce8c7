//! Ledger collaborator interfaces and the redemption record store
//!
//! The ledger is external: property storage, transfers and message delivery
//! are remote calls that may fail or time out. Nothing here retries.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::types::{ChainId, EncryptedMessage, InboundTransaction, PropertyEntry, Receipt};

/// Write-side and lookup operations the protocol needs from the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Properties set by `setter` on `owner` under `key` (empty = absent)
    async fn property_get(&self, owner: &str, setter: &str, key: &str)
        -> Result<Vec<PropertyEntry>>;

    /// Set `key = value` on `owner`, signed by the custodial account
    async fn property_set(&self, owner: &str, key: &str, value: &str) -> Result<Receipt>;

    /// Send `amount` on `chain` from the custodial account to `recipient`
    async fn transfer(&self, chain: ChainId, recipient: &str, amount: u64) -> Result<Receipt>;

    /// Attach an encrypted message to a transaction addressed to `recipient`
    async fn send_message(
        &self,
        chain: ChainId,
        recipient: &str,
        message: &EncryptedMessage,
    ) -> Result<Receipt>;

    /// Message public key of `account`, if it has been announced on the ledger
    async fn account_public_key(&self, account: &str) -> Result<Option<[u8; 32]>>;

    /// Whether property writes are exclusive per key (at most one write wins).
    /// Without it two concurrent redemptions of one token can both disburse.
    fn exclusive_property_writes(&self) -> bool {
        false
    }
}

/// Source of inbound transactions for the deposit watcher
#[async_trait]
pub trait DepositSource: Send + Sync {
    async fn current_height(&self) -> Result<u64>;

    /// Transactions executed at `height` on `chain` with `account` as recipient
    async fn incoming_transactions(
        &self,
        account: &str,
        chain: ChainId,
        height: u64,
    ) -> Result<Vec<InboundTransaction>>;
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Account {owner} is not writable by custodian {custodian}")]
    Unauthorized { owner: String, custodian: String },

    #[error("Record store failure: {0}")]
    Store(eyre::Report),
}

/// Redemption records kept as custodial account properties, keyed by fingerprint
pub struct RedemptionLedger {
    ledger: Arc<dyn Ledger>,
    custodian: String,
}

impl RedemptionLedger {
    pub fn new(ledger: Arc<dyn Ledger>, custodian: impl Into<String>) -> Self {
        Self {
            ledger,
            custodian: custodian.into(),
        }
    }

    pub fn custodian(&self) -> &str {
        &self.custodian
    }

    /// Recipient recorded for `key`, if the token was redeemed
    pub async fn get(&self, owner: &str, key: &Fingerprint) -> Result<Option<String>, RecordError> {
        let entries = self
            .ledger
            .property_get(owner, &self.custodian, key.as_str())
            .await
            .map_err(RecordError::Store)?;
        Ok(entries.into_iter().next().map(|e| e.value))
    }

    /// Record `value` under `key`. Only the custodial namespace is writable.
    pub async fn set(
        &self,
        owner: &str,
        key: &Fingerprint,
        value: &str,
    ) -> Result<Receipt, RecordError> {
        if !same_account(owner, &self.custodian) {
            return Err(RecordError::Unauthorized {
                owner: owner.to_string(),
                custodian: self.custodian.clone(),
            });
        }
        self.ledger
            .property_set(owner, key.as_str(), value)
            .await
            .map_err(RecordError::Store)
    }
}

/// Account comparison; hex addresses differ only in checksum casing
pub fn same_account(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
