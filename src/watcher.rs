//! Deposit watcher
//!
//! Polls the ledger for transactions sent to the custodial account and feeds
//! them to the [`DepositListener`]. Every transaction is claimed in Postgres
//! before it is handled, so a restart never issues or refunds twice.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::DepositConfig;
use crate::db::{self, DepositStatus, NewDepositClaim};
use crate::ledger::DepositSource;
use crate::listener::{DepositListener, DepositOutcome};
use crate::metrics;
use crate::types::{ChainId, InboundTransaction};

/// Upper bound on heights walked per chain in one pass
const MAX_HEIGHTS_PER_PASS: u64 = 100;

pub struct DepositWatcher {
    source: Arc<dyn DepositSource>,
    listener: DepositListener,
    db: PgPool,
    custodian: String,
    chains: Vec<ChainId>,
    start_height: u64,
    poll_interval: Duration,
}

impl DepositWatcher {
    pub fn new(
        config: &DepositConfig,
        source: Arc<dyn DepositSource>,
        listener: DepositListener,
        db: PgPool,
        custodian: &str,
    ) -> Self {
        Self {
            source,
            listener,
            db,
            custodian: custodian.to_string(),
            chains: config.watched_chains.clone(),
            start_height: config.start_height,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Run the watcher loop until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            custodian = %self.custodian,
            chains = ?self.chains,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Deposit watcher started"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                metrics::record_error("watcher", "poll");
                warn!(error = %e, "Deposit poll failed, retrying next interval");
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Deposit watcher shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One pass over every watched chain
    pub async fn poll_once(&self) -> Result<()> {
        let current = self.source.current_height().await?;

        for &chain in &self.chains {
            let next = db::get_last_height(&self.db, chain.as_u32() as i32)
                .await?
                .map(|h| h as u64 + 1)
                .unwrap_or(self.start_height);

            if next > current {
                continue;
            }

            let end = current.min(next + MAX_HEIGHTS_PER_PASS - 1);
            for height in next..=end {
                // A fetch failure ends the pass; the height is retried next time
                let transactions = self
                    .source
                    .incoming_transactions(&self.custodian, chain, height)
                    .await?;

                for tx in &transactions {
                    self.process_transaction(tx, height).await?;
                }

                db::update_last_height(&self.db, chain.as_u32() as i32, height as i64).await?;
            }

            metrics::record_height(&chain.to_string(), end);
            debug!(chain = %chain, from = next, to = end, "Processed heights");
        }

        Ok(())
    }

    /// Claim, handle and record a single transaction
    async fn process_transaction(&self, tx: &InboundTransaction, height: u64) -> Result<()> {
        let claim = NewDepositClaim {
            tx_hash: tx.full_hash.clone(),
            chain_id: tx.chain.as_u32() as i32,
            height: height as i64,
            depositor: tx.sender.clone(),
            amount: tx.amount,
        };

        if !db::claim_deposit(&self.db, &claim).await? {
            debug!(tx_hash = %tx.full_hash, "Transaction already claimed, skipping");
            return Ok(());
        }

        match self.listener.handle(tx).await {
            Ok(outcome) => {
                let (status, detail) = match &outcome {
                    DepositOutcome::Ignored { guard, reason } => {
                        (DepositStatus::Ignored, Some(format!("{}: {}", guard, reason)))
                    }
                    DepositOutcome::Refunded { .. } => (DepositStatus::Refunded, None),
                    DepositOutcome::Issued { .. } => (DepositStatus::Issued, None),
                };
                db::complete_deposit(
                    &self.db,
                    &tx.full_hash,
                    status,
                    outcome.response_tx_hash(),
                    detail.as_deref(),
                )
                .await?;
            }
            Err(e) => {
                metrics::record_error("listener", "deposit");
                error!(
                    tx_hash = %tx.full_hash,
                    depositor = %tx.sender,
                    amount = tx.amount,
                    chain = %tx.chain,
                    error = %e,
                    "Deposit handling failed, needs operator review"
                );
                db::fail_deposit(&self.db, &tx.full_hash, &format!("{:#}", e)).await?;
            }
        }

        Ok(())
    }
}
