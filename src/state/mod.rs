use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::flow::SessionHandle;
use crate::proof::ProofClient;
use crate::signer::Wallet;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub proof_client: ProofClient,
    /// Wallet offered on `connect`; `None` when no key is configured.
    pub wallet: Option<Arc<dyn Wallet>>,
    pub request_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        session: SessionHandle,
        proof_client: ProofClient,
        wallet: Option<Arc<dyn Wallet>>,
        request_timeout: Duration,
    ) -> Self {
        assert!(
            request_timeout >= Duration::from_millis(100),
            "Request timeout must be configured"
        );
        Self {
            session,
            proof_client,
            wallet,
            request_timeout,
            start_time: Instant::now(),
        }
    }
}
