//! Deposit watcher tests against Postgres
//!
//! Run with: cargo test --test watcher_db -- --ignored --test-threads=1
//!
//! Prerequisites:
//! - DATABASE_URL pointing at a disposable Postgres database

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use sqlx::PgPool;
use x25519_dalek::{PublicKey, StaticSecret};

use gift::config::DepositConfig;
use gift::crypto::MessageSealer;
use gift::db::{self, DepositStatus, NewUnpaidRedemption};
use gift::listener::DepositListener;
use gift::testing::{InboundBuilder, MemoryLedger};
use gift::token::TokenCodec;
use gift::types::ChainId;
use gift::watcher::DepositWatcher;

const DEPOSITOR: &str = "RS-DEPOSITOR";

async fn fresh_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = db::create_pool(&url).await.ok()?;
    db::run_migrations(&pool).await.ok()?;
    sqlx::query("TRUNCATE watcher_cursor, processed_deposits, unpaid_redemptions")
        .execute(&pool)
        .await
        .ok()?;
    Some(pool)
}

fn watcher(memory: Arc<MemoryLedger>, pool: PgPool) -> (DepositWatcher, String) {
    let codec = TokenCodec::new(PrivateKeySigner::random());
    let custodian = codec.address().to_checksum(None);
    let listener = DepositListener::new(
        memory.clone(),
        codec,
        MessageSealer::from_custodian_secret(&[3u8; 32]),
        &custodian,
        vec![ChainId(3)],
        ChainId(2),
    );
    let config = DepositConfig {
        watched_chains: vec![ChainId(1), ChainId(2)],
        excluded_chains: vec![ChainId(3)],
        message_chain: ChainId(2),
        start_height: 1,
        poll_interval_ms: 10,
    };
    let watcher = DepositWatcher::new(&config, memory, listener, pool, &custodian);
    (watcher, custodian)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deposits_are_processed_once() {
    let Some(pool) = fresh_pool().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };
    let memory = Arc::new(MemoryLedger::new());
    memory.set_public_key(DEPOSITOR, PublicKey::from(&StaticSecret::from([1u8; 32])).to_bytes());

    let (watcher, custodian) = watcher(memory.clone(), pool.clone());
    memory.push_incoming(
        InboundBuilder::payment(DEPOSITOR, &custodian, 100, 2)
            .hash("aa01")
            .height(1)
            .build(),
    );
    memory.push_incoming(
        InboundBuilder::payment(DEPOSITOR, &custodian, 200, 1)
            .hash("aa02")
            .height(2)
            .phased()
            .build(),
    );

    watcher.poll_once().await.unwrap();
    assert_eq!(memory.messages().len(), 1);
    assert_eq!(memory.transfers().len(), 1);
    assert_eq!(db::get_last_height(&pool, 2).await.unwrap(), Some(2));

    // Rewinding the cursor must not issue or refund again
    db::update_last_height(&pool, 1, 0).await.unwrap();
    db::update_last_height(&pool, 2, 0).await.unwrap();
    watcher.poll_once().await.unwrap();
    assert_eq!(memory.messages().len(), 1);
    assert_eq!(memory.transfers().len(), 1);

    assert_eq!(
        db::count_deposits_by_status(&pool, DepositStatus::Issued)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        db::count_deposits_by_status(&pool, DepositStatus::Refunded)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_deposit_is_surfaced_for_review() {
    let Some(pool) = fresh_pool().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };
    let memory = Arc::new(MemoryLedger::new());
    let (watcher, custodian) = watcher(memory.clone(), pool.clone());

    // No public key known for this depositor
    memory.push_incoming(
        InboundBuilder::payment("RS-NOKEY", &custodian, 100, 2)
            .hash("bb01")
            .height(1)
            .build(),
    );

    watcher.poll_once().await.unwrap();
    let review = db::get_deposits_needing_review(&pool).await.unwrap();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].tx_hash, "bb01");
    assert_eq!(review[0].status, "failed");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_fetch_failure_keeps_cursor() {
    let Some(pool) = fresh_pool().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };
    let memory = Arc::new(MemoryLedger::new());
    let (watcher, _) = watcher(memory.clone(), pool.clone());
    memory.set_height(5);
    memory.fail_incoming(true);

    assert!(watcher.poll_once().await.is_err());
    assert_eq!(db::get_last_height(&pool, 1).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unpaid_redemptions_roundtrip() {
    let Some(pool) = fresh_pool().await else {
        eprintln!("DATABASE_URL not set or unreachable, skipping");
        return;
    };

    let id = db::insert_unpaid_redemption(
        &pool,
        &NewUnpaidRedemption {
            fingerprint: "0123456789abcdef0123456789abcdef".to_string(),
            recipient: "RS-AAA".to_string(),
            amount: 500_000_000,
            chain_id: 2,
            record_tx_hash: "cc01".to_string(),
            error: "transfer rejected".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(id > 0);

    let unpaid = db::get_unpaid_redemptions(&pool).await.unwrap();
    assert_eq!(unpaid.len(), 1);
    assert_eq!(unpaid[0].recipient, "RS-AAA");
    assert_eq!(db::count_unpaid_redemptions(&pool).await.unwrap(), 1);
}
