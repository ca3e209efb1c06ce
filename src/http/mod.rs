use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::flow::FlowError;
use crate::proof::ProofError;
use crate::state::AppState;

mod proofs;
mod session;

pub fn router(state: AppState) -> Router {
    // Browser front ends drive the session from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let session_router = session::router().with_state(state.clone());
    let proofs_router = proofs::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .nest("/session", session_router)
        .nest("/proofs", proofs_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    let request_timeout_ms = u64::try_from(state.request_timeout.as_millis())
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
        proof_service_configured: state.proof_client.is_configured(),
        wallet_configured: state.wallet.is_some(),
        request_timeout_ms,
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    proof_service_configured: bool,
    wallet_configured: bool,
    request_timeout_ms: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }
}

impl From<FlowError> for HttpError {
    fn from(err: FlowError) -> Self {
        let status = match &err {
            FlowError::NotConnected | FlowError::Busy | FlowError::NothingToSubmit => {
                StatusCode::CONFLICT
            }
            FlowError::InvalidIdentity(_) | FlowError::MissingProofLocation => {
                StatusCode::BAD_REQUEST
            }
            FlowError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            FlowError::Signing { .. } | FlowError::Proof { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ProofError> for HttpError {
    fn from(err: ProofError) -> Self {
        let status = match &err {
            ProofError::ConfigMissing => StatusCode::SERVICE_UNAVAILABLE,
            ProofError::NotFound(_) | ProofError::Service { status: 404, .. } => {
                StatusCode::NOT_FOUND
            }
            ProofError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProofError::Service { .. } | ProofError::Transport(_) | ProofError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}
