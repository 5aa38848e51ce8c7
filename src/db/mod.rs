use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::error;

pub mod models;

pub use models::*;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

// ============ Watcher Cursor ============

/// Get last processed height for a chain
pub async fn get_last_height(pool: &PgPool, chain_id: i32) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"SELECT last_processed_height FROM watcher_cursor WHERE chain_id = $1"#,
    )
    .bind(chain_id)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to get last processed height")?;

    Ok(row.map(|r| r.0))
}

/// Update last processed height for a chain
pub async fn update_last_height(pool: &PgPool, chain_id: i32, height: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO watcher_cursor (chain_id, last_processed_height)
        VALUES ($1, $2)
        ON CONFLICT (chain_id) DO UPDATE SET last_processed_height = $2, updated_at = NOW()
        "#,
    )
    .bind(chain_id)
    .bind(height)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update last height for chain {}", chain_id))?;

    Ok(())
}

// ============ Deposit Claims ============

/// Claim an inbound transaction. Returns false if it was already claimed.
pub async fn claim_deposit(pool: &PgPool, claim: &NewDepositClaim) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_deposits (tx_hash, chain_id, height, depositor, amount, status)
        VALUES ($1, $2, $3, $4, $5, 'processing')
        ON CONFLICT (tx_hash) DO NOTHING
        "#,
    )
    .bind(&claim.tx_hash)
    .bind(claim.chain_id)
    .bind(claim.height)
    .bind(&claim.depositor)
    .bind(claim.amount)
    .execute(pool)
    .await
    .map_err(|e| {
        error!("SQL error claiming deposit {}: {:?}", claim.tx_hash, e);
        e
    })
    .wrap_err("Failed to claim deposit")?;

    Ok(result.rows_affected() == 1)
}

/// Record the listener outcome for a claimed transaction
pub async fn complete_deposit(
    pool: &PgPool,
    tx_hash: &str,
    status: DepositStatus,
    response_tx_hash: Option<&str>,
    detail: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE processed_deposits
        SET status = $2, response_tx_hash = $3, detail = $4, updated_at = NOW()
        WHERE tx_hash = $1
        "#,
    )
    .bind(tx_hash)
    .bind(status.as_str())
    .bind(response_tx_hash)
    .bind(detail)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update deposit {}", tx_hash))?;

    Ok(())
}

/// Mark a claimed transaction as failed
pub async fn fail_deposit(pool: &PgPool, tx_hash: &str, error: &str) -> Result<()> {
    complete_deposit(pool, tx_hash, DepositStatus::Failed, None, Some(error)).await
}

/// Claimed transactions that are failed or never finished
pub async fn get_deposits_needing_review(pool: &PgPool) -> Result<Vec<ProcessedDeposit>> {
    let rows = sqlx::query_as::<_, ProcessedDeposit>(
        r#"SELECT id, tx_hash, chain_id, height, depositor, amount, status, response_tx_hash,
                  detail, created_at, updated_at
           FROM processed_deposits WHERE status IN ('processing', 'failed')
           ORDER BY created_at"#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("Failed to get deposits needing review")?;

    Ok(rows)
}

/// Count claimed transactions per status
pub async fn count_deposits_by_status(pool: &PgPool, status: DepositStatus) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM processed_deposits WHERE status = $1"#)
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .wrap_err("Failed to count deposits")?;

    Ok(row.0)
}

// ============ Unpaid Redemptions ============

pub async fn insert_unpaid_redemption(
    pool: &PgPool,
    unpaid: &NewUnpaidRedemption,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO unpaid_redemptions (fingerprint, recipient, amount, chain_id,
            record_tx_hash, error)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&unpaid.fingerprint)
    .bind(&unpaid.recipient)
    .bind(unpaid.amount)
    .bind(unpaid.chain_id)
    .bind(&unpaid.record_tx_hash)
    .bind(&unpaid.error)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to insert unpaid redemption")?;

    Ok(row.0)
}

pub async fn get_unpaid_redemptions(pool: &PgPool) -> Result<Vec<UnpaidRedemption>> {
    let rows = sqlx::query_as::<_, UnpaidRedemption>(
        r#"SELECT id, fingerprint, recipient, amount, chain_id, record_tx_hash, error,
                  resolved, created_at
           FROM unpaid_redemptions WHERE resolved = FALSE ORDER BY created_at"#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("Failed to get unpaid redemptions")?;

    Ok(rows)
}

pub async fn count_unpaid_redemptions(pool: &PgPool) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM unpaid_redemptions WHERE resolved = FALSE"#)
            .fetch_one(pool)
            .await
            .wrap_err("Failed to count unpaid redemptions")?;

    Ok(row.0)
}
