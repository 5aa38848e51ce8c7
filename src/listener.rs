//! Deposit listener
//!
//! Turns an inbound payment to the custodial account into either a delivered
//! token pair, a refund, or nothing. Guards run in order before the body;
//! the first guard that does not pass decides the outcome.

use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

use crate::crypto::MessageSealer;
use crate::ledger::{same_account, Ledger};
use crate::metrics;
use crate::token::{TokenCodec, TokenPair};
use crate::types::{ChainId, Deposit, InboundTransaction, Receipt};

/// Result of a single guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Continue,
    /// Not processed by this protocol; nothing is sent
    Reject(String),
    /// Send the full amount back to the depositor
    Refund,
}

/// Pre-condition evaluated before a deposit is handled
pub trait DepositGuard: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, tx: &InboundTransaction) -> GuardOutcome;
}

/// Only parent- and child-chain payments are deposits
pub struct PaymentTypeGuard;

impl DepositGuard for PaymentTypeGuard {
    fn name(&self) -> &'static str {
        "payment_type"
    }

    fn check(&self, tx: &InboundTransaction) -> GuardOutcome {
        if tx.kind().is_payment() {
            GuardOutcome::Continue
        } else {
            GuardOutcome::Reject(format!(
                "transaction type {}:{} is not a payment",
                tx.tx_type, tx.subtype
            ))
        }
    }
}

/// The custodial account must be the recipient
pub struct RecipientGuard {
    custodian: String,
}

impl RecipientGuard {
    pub fn new(custodian: impl Into<String>) -> Self {
        Self {
            custodian: custodian.into(),
        }
    }
}

impl DepositGuard for RecipientGuard {
    fn name(&self) -> &'static str {
        "recipient"
    }

    fn check(&self, tx: &InboundTransaction) -> GuardOutcome {
        if same_account(&tx.recipient, &self.custodian) {
            GuardOutcome::Continue
        } else {
            GuardOutcome::Reject(format!("recipient {} is not the custodian", tx.recipient))
        }
    }
}

pub struct PositiveAmountGuard;

impl DepositGuard for PositiveAmountGuard {
    fn name(&self) -> &'static str {
        "amount"
    }

    fn check(&self, tx: &InboundTransaction) -> GuardOutcome {
        if tx.amount > 0 {
            GuardOutcome::Continue
        } else {
            GuardOutcome::Reject(format!("amount {} is not positive", tx.amount))
        }
    }
}

/// Chains whose deposits are never processed
pub struct ExcludedChainGuard {
    excluded: Vec<ChainId>,
}

impl ExcludedChainGuard {
    pub fn new(excluded: Vec<ChainId>) -> Self {
        Self { excluded }
    }
}

impl DepositGuard for ExcludedChainGuard {
    fn name(&self) -> &'static str {
        "excluded_chain"
    }

    fn check(&self, tx: &InboundTransaction) -> GuardOutcome {
        if self.excluded.contains(&tx.chain) {
            GuardOutcome::Reject(format!("chain {} is excluded", tx.chain))
        } else {
            GuardOutcome::Continue
        }
    }
}

/// Phased payments are not final and get refunded
pub struct ConditionalGuard;

impl DepositGuard for ConditionalGuard {
    fn name(&self) -> &'static str {
        "conditional"
    }

    fn check(&self, tx: &InboundTransaction) -> GuardOutcome {
        if tx.phased {
            GuardOutcome::Refund
        } else {
            GuardOutcome::Continue
        }
    }
}

/// What the listener did with a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Ignored { guard: &'static str, reason: String },
    Refunded { receipt: Receipt },
    Issued { receipt: Receipt, pair: TokenPair },
}

impl DepositOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DepositOutcome::Ignored { .. } => "ignored",
            DepositOutcome::Refunded { .. } => "refunded",
            DepositOutcome::Issued { .. } => "issued",
        }
    }

    /// Hash of the transaction the listener sent, if any
    pub fn response_tx_hash(&self) -> Option<&str> {
        match self {
            DepositOutcome::Ignored { .. } => None,
            DepositOutcome::Refunded { receipt } | DepositOutcome::Issued { receipt, .. } => {
                Some(&receipt.full_hash)
            }
        }
    }
}

pub struct DepositListener {
    ledger: Arc<dyn Ledger>,
    codec: TokenCodec,
    sealer: MessageSealer,
    guards: Vec<Box<dyn DepositGuard>>,
    message_chain: ChainId,
}

impl DepositListener {
    /// Listener with the standard guard order: payment type, recipient,
    /// amount, excluded chains, conditional refund
    pub fn new(
        ledger: Arc<dyn Ledger>,
        codec: TokenCodec,
        sealer: MessageSealer,
        custodian: &str,
        excluded_chains: Vec<ChainId>,
        message_chain: ChainId,
    ) -> Self {
        let guards: Vec<Box<dyn DepositGuard>> = vec![
            Box::new(PaymentTypeGuard),
            Box::new(RecipientGuard::new(custodian)),
            Box::new(PositiveAmountGuard),
            Box::new(ExcludedChainGuard::new(excluded_chains)),
            Box::new(ConditionalGuard),
        ];
        Self {
            ledger,
            codec,
            sealer,
            guards,
            message_chain,
        }
    }

    pub fn guard_names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    pub async fn handle(&self, tx: &InboundTransaction) -> Result<DepositOutcome> {
        let result = self.process(tx).await;
        match &result {
            Ok(outcome) => metrics::record_deposit(outcome.label()),
            Err(_) => metrics::record_deposit("failed"),
        }
        result
    }

    async fn process(&self, tx: &InboundTransaction) -> Result<DepositOutcome> {
        let mut refund = false;
        for guard in &self.guards {
            match guard.check(tx) {
                GuardOutcome::Continue => {}
                GuardOutcome::Reject(reason) => {
                    info!(
                        tx_hash = %tx.full_hash,
                        guard = guard.name(),
                        reason = %reason,
                        "Deposit ignored"
                    );
                    return Ok(DepositOutcome::Ignored {
                        guard: guard.name(),
                        reason,
                    });
                }
                GuardOutcome::Refund => {
                    refund = true;
                    break;
                }
            }
        }

        let deposit = Deposit::from_transaction(tx)
            .ok_or_else(|| eyre!("Transaction {} carries no positive amount", tx.full_hash))?;

        if refund {
            return self.refund(&deposit).await;
        }
        self.issue(tx, &deposit).await
    }

    async fn refund(&self, deposit: &Deposit) -> Result<DepositOutcome> {
        let receipt = self
            .ledger
            .transfer(deposit.chain, &deposit.depositor, deposit.amount)
            .await
            .wrap_err_with(|| format!("Refund of {} failed", deposit.tx_hash))?;

        info!(
            tx_hash = %deposit.tx_hash,
            depositor = %deposit.depositor,
            amount = deposit.amount,
            chain = %deposit.chain,
            refund_tx = %receipt.full_hash,
            "Conditional deposit refunded"
        );
        Ok(DepositOutcome::Refunded { receipt })
    }

    async fn issue(&self, tx: &InboundTransaction, deposit: &Deposit) -> Result<DepositOutcome> {
        let pair = self
            .codec
            .issue_pair(deposit.amount, deposit.chain, deposit.timestamp)?;

        let public_key = match tx.sender_key_bytes() {
            Some(key) => key,
            None => {
                debug!(depositor = %deposit.depositor, "Public key not in transaction, asking ledger");
                self.ledger
                    .account_public_key(&deposit.depositor)
                    .await?
                    .ok_or_else(|| {
                        warn!(depositor = %deposit.depositor, "Depositor has no public key");
                        eyre!("No public key known for depositor {}", deposit.depositor)
                    })?
            }
        };

        let sealed = self.sealer.seal(&public_key, pair.to_message().as_bytes())?;
        let receipt = self
            .ledger
            .send_message(self.message_chain, &deposit.depositor, &sealed)
            .await
            .wrap_err_with(|| format!("Token delivery for {} failed", deposit.tx_hash))?;

        metrics::TOKENS_ISSUED.inc();
        info!(
            tx_hash = %deposit.tx_hash,
            depositor = %deposit.depositor,
            amount = deposit.amount,
            chain = %deposit.chain,
            message_tx = %receipt.full_hash,
            redeem_token = %pair.redeem,
            view_token = %pair.view,
            "Token pair issued"
        );
        Ok(DepositOutcome::Issued { receipt, pair })
    }
}
