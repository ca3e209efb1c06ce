mod config;
mod flow;
mod http;
mod identity;
mod models;
mod proof;
mod signer;
mod state;

use std::sync::Arc;

use crate::config::BinderConfig;
use crate::flow::{Orchestrator, SessionHandle, SessionSnapshot};
use crate::proof::{ProofClient, ReqwestTransport};
use crate::signer::{LocalWallet, Wallet};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = BinderConfig::load().context("Failed to load configuration")?;

    let request_timeout = config.proof_service.request_timeout();
    let transport = ReqwestTransport::new(request_timeout)
        .context("Failed to initialize proof service transport")?;
    let base_url = config.proof_service.base_url();
    if base_url.is_none() {
        warn!("Proof service base URL is not configured; proof calls will fail");
    }
    let proof_client = ProofClient::new(base_url, Arc::new(transport));

    let wallet = load_wallet(&config)?;

    let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
    let orchestrator = Orchestrator::new(proof_client.clone(), snapshot_tx);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (session, session_handle) = SessionHandle::spawn(orchestrator, shutdown_rx);
    session
        .select_network(config.wallet.network.clone())
        .await
        .context("Failed to select initial network")?;

    let app_state = AppState::new(session, proof_client, wallet, request_timeout);

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("next.id binder listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = session_handle.await {
        error!("Session task join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info,tower_http=debug";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

fn load_wallet(config: &BinderConfig) -> Result<Option<Arc<dyn Wallet>>> {
    let Some(secret) = config.wallet.private_key.as_deref() else {
        warn!("No wallet key configured; connect will be refused");
        return Ok(None);
    };
    let wallet = LocalWallet::from_hex(secret).context("Failed to load wallet private key")?;
    info!(
        address = %wallet.address(),
        public_key = %wallet.public_key_hex(),
        "Wallet loaded"
    );
    Ok(Some(Arc::new(wallet)))
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
