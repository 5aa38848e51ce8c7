//! In-memory ledger for tests
//!
//! Implements [`Ledger`] and [`DepositSource`] with call counters and failure
//! injection so tests can assert which collaborator calls happened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::{eyre, Result};

use crate::ledger::{DepositSource, Ledger};
use crate::types::{ChainId, EncryptedMessage, InboundTransaction, PropertyEntry, Receipt};

/// Transfer recorded by [`MemoryLedger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub chain: ChainId,
    pub recipient: String,
    pub amount: u64,
}

/// Message recorded by [`MemoryLedger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub chain: ChainId,
    pub recipient: String,
    pub message: EncryptedMessage,
}

#[derive(Default)]
struct State {
    /// (owner lowercase, key) -> value
    properties: HashMap<(String, String), String>,
    transfers: Vec<RecordedTransfer>,
    messages: Vec<RecordedMessage>,
    public_keys: HashMap<String, [u8; 32]>,
    /// (chain, height) -> transactions
    incoming: HashMap<(u32, u64), Vec<InboundTransaction>>,
    height: u64,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    tx_counter: AtomicU64,
    property_get_calls: AtomicU64,
    property_set_calls: AtomicU64,
    fail_property_get: AtomicBool,
    fail_property_set: AtomicBool,
    fail_transfer: AtomicBool,
    fail_incoming: AtomicBool,
    exclusive_writes: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_receipt(&self, chain: ChainId) -> Receipt {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Receipt {
            full_hash: format!("{:064x}", n),
            chain,
        }
    }

    pub fn fail_property_get(&self, fail: bool) {
        self.fail_property_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_property_set(&self, fail: bool) {
        self.fail_property_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transfer(&self, fail: bool) {
        self.fail_transfer.store(fail, Ordering::SeqCst);
    }

    pub fn fail_incoming(&self, fail: bool) {
        self.fail_incoming.store(fail, Ordering::SeqCst);
    }

    /// Declare per-key exclusive property writes
    pub fn set_exclusive_property_writes(&self, exclusive: bool) {
        self.exclusive_writes.store(exclusive, Ordering::SeqCst);
    }

    pub fn property_get_calls(&self) -> u64 {
        self.property_get_calls.load(Ordering::SeqCst)
    }

    pub fn property_set_calls(&self) -> u64 {
        self.property_set_calls.load(Ordering::SeqCst)
    }

    /// Total collaborator calls that touch redemption state or funds
    pub fn mutating_calls(&self) -> usize {
        let state = self.state();
        self.property_set_calls() as usize + state.transfers.len() + state.messages.len()
    }

    pub fn property(&self, owner: &str, key: &str) -> Option<String> {
        self.state()
            .properties
            .get(&(owner.to_lowercase(), key.to_string()))
            .cloned()
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.state().transfers.clone()
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.state().messages.clone()
    }

    pub fn set_public_key(&self, account: &str, key: [u8; 32]) {
        self.state().public_keys.insert(account.to_string(), key);
    }

    /// Queue an inbound transaction at its `height` and raise the chain tip
    pub fn push_incoming(&self, tx: InboundTransaction) {
        let mut state = self.state();
        let height = u64::try_from(tx.height).unwrap_or(0);
        state.height = state.height.max(height);
        state
            .incoming
            .entry((tx.chain.as_u32(), height))
            .or_default()
            .push(tx);
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn property_get(
        &self,
        owner: &str,
        _setter: &str,
        key: &str,
    ) -> Result<Vec<PropertyEntry>> {
        self.property_get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_property_get.load(Ordering::SeqCst) {
            return Err(eyre!("property lookup unavailable"));
        }
        Ok(self
            .property(owner, key)
            .map(|value| PropertyEntry {
                property: key.to_string(),
                value,
            })
            .into_iter()
            .collect())
    }

    async fn property_set(&self, owner: &str, key: &str, value: &str) -> Result<Receipt> {
        self.property_set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_property_set.load(Ordering::SeqCst) {
            return Err(eyre!("property write rejected"));
        }
        self.state()
            .properties
            .insert((owner.to_lowercase(), key.to_string()), value.to_string());
        Ok(self.next_receipt(ChainId(2)))
    }

    async fn transfer(&self, chain: ChainId, recipient: &str, amount: u64) -> Result<Receipt> {
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(eyre!("transfer rejected"));
        }
        self.state().transfers.push(RecordedTransfer {
            chain,
            recipient: recipient.to_string(),
            amount,
        });
        Ok(self.next_receipt(chain))
    }

    async fn send_message(
        &self,
        chain: ChainId,
        recipient: &str,
        message: &EncryptedMessage,
    ) -> Result<Receipt> {
        self.state().messages.push(RecordedMessage {
            chain,
            recipient: recipient.to_string(),
            message: message.clone(),
        });
        Ok(self.next_receipt(chain))
    }

    async fn account_public_key(&self, account: &str) -> Result<Option<[u8; 32]>> {
        Ok(self.state().public_keys.get(account).copied())
    }

    fn exclusive_property_writes(&self) -> bool {
        self.exclusive_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DepositSource for MemoryLedger {
    async fn current_height(&self) -> Result<u64> {
        Ok(self.state().height)
    }

    async fn incoming_transactions(
        &self,
        account: &str,
        chain: ChainId,
        height: u64,
    ) -> Result<Vec<InboundTransaction>> {
        if self.fail_incoming.load(Ordering::SeqCst) {
            return Err(eyre!("node unreachable"));
        }
        Ok(self
            .state()
            .incoming
            .get(&(chain.as_u32(), height))
            .map(|txs| {
                txs.iter()
                    .filter(|tx| tx.recipient.eq_ignore_ascii_case(account))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Builder for inbound payments in tests
pub struct InboundBuilder {
    tx: InboundTransaction,
}

impl InboundBuilder {
    /// Child-chain payment of `amount` on `chain` from `sender` to `recipient`
    pub fn payment(sender: &str, recipient: &str, amount: i64, chain: u32) -> Self {
        Self {
            tx: InboundTransaction {
                full_hash: format!("{:064x}", amount as u64 ^ (chain as u64) << 56),
                chain: ChainId(chain),
                tx_type: 0,
                subtype: 0,
                sender: sender.to_string(),
                sender_public_key: None,
                recipient: recipient.to_string(),
                amount,
                phased: false,
                height: 1,
                timestamp: 1_000,
            },
        }
    }

    pub fn hash(mut self, full_hash: &str) -> Self {
        self.tx.full_hash = full_hash.to_string();
        self
    }

    pub fn kind(mut self, tx_type: i8, subtype: i8) -> Self {
        self.tx.tx_type = tx_type;
        self.tx.subtype = subtype;
        self
    }

    pub fn phased(mut self) -> Self {
        self.tx.phased = true;
        self
    }

    pub fn height(mut self, height: i64) -> Self {
        self.tx.height = height;
        self
    }

    pub fn sender_public_key(mut self, key: [u8; 32]) -> Self {
        self.tx.sender_public_key = Some(hex::encode(key));
        self
    }

    pub fn build(self) -> InboundTransaction {
        self.tx
    }
}
