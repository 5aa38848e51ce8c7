//! CL8Y Gift Service
//!
//! Issues signed single-use gift tokens for deposits to the custodial account
//! and redeems them exactly once.
//!
//! # Processes
//!
//! - Deposit watcher: polls the ledger node, claims each inbound transaction,
//!   then issues a sealed token pair, refunds, or ignores it
//! - HTTP API: token status queries and redemptions on `/gift`, plus health,
//!   metrics and the pending (operator review) view

use std::sync::Arc;

use eyre::eyre;
use tracing::{error, info};

use gift::config::Config;
use gift::crypto::MessageSealer;
use gift::db;
use gift::gateway::RedemptionGateway;
use gift::ledger::same_account;
use gift::listener::DepositListener;
use gift::node_client::NodeClient;
use gift::server::{self, AppState};
use gift::token::TokenCodec;
use gift::watcher::DepositWatcher;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting CL8Y Gift Service");

    let config = Config::load()?;

    let codec = TokenCodec::from_private_key(&config.custodian.private_key)?;
    let custodian = codec.address().to_checksum(None);
    if let Some(ref expected) = config.custodian.address {
        if !same_account(expected, &custodian) {
            return Err(eyre!(
                "CUSTODIAN_ADDRESS {} does not match the address of the custodian key {}",
                expected,
                custodian
            ));
        }
    }
    let sealer = MessageSealer::from_custodian_secret(&config.custodian.secret_bytes()?);

    info!(
        custodian = %custodian,
        node_url = %config.node.url,
        watched_chains = ?config.deposits.watched_chains,
        excluded_chains = ?config.deposits.excluded_chains,
        message_chain = %config.deposits.message_chain,
        sealing_key = %hex::encode(sealer.public_key()),
        "Configuration loaded"
    );

    let db = db::create_pool(&config.database.url).await?;
    info!("Database connected");

    db::run_migrations(&db).await?;
    info!("Database migrations complete");

    let node = Arc::new(NodeClient::new(
        &config.node.url,
        config.node.signing_secret.clone(),
        config.node.property_chain,
    )?);

    let gateway = Arc::new(RedemptionGateway::new(node.clone(), codec.address()));
    let listener = DepositListener::new(
        node.clone(),
        codec,
        sealer,
        &custodian,
        config.deposits.excluded_chains.clone(),
        config.deposits.message_chain,
    );
    let watcher = DepositWatcher::new(&config.deposits, node, listener, db.clone(), &custodian);

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let state = AppState::new(gateway, Some(db));
    let bind_address = config.api.bind_address.clone();
    let port = config.api.port;
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&bind_address, port, state).await {
            error!(error = %e, "API server error");
        }
    });

    watcher.run(shutdown_rx).await?;

    gift::metrics::UP.set(0.0);
    info!("CL8Y Gift Service stopped");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` selects JSON output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cl8y_gift=debug,gift=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
