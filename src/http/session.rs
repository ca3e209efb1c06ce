use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WALLET_KEY_VAR;
use crate::flow::{FlowError, PlatformDescriptor, SessionSnapshot};
use crate::models::proof::Platform;
use crate::state::AppState;

use super::HttpError;

const MAX_NETWORK_LEN: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_session))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/network", post(select_network))
        .route("/bind", post(bind))
        .route("/submit", post(submit))
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    snapshot: SessionSnapshot,
    pending: bool,
    outcome_message: Option<String>,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            pending: snapshot.state.is_pending(),
            outcome_message: snapshot.outcome_message(),
            snapshot,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkRequest {
    network: String,
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    platform: Platform,
    handle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    proof_location: String,
}

impl BindRequest {
    fn into_descriptor(self) -> Result<PlatformDescriptor, FlowError> {
        match self.platform {
            Platform::Ethereum => Ok(PlatformDescriptor::ethereum()),
            Platform::Twitter => {
                let handle = self
                    .handle
                    .filter(|handle| !handle.trim().is_empty())
                    .ok_or_else(|| {
                        FlowError::InvalidIdentity("twitter binding requires a handle".to_string())
                    })?;
                Ok(PlatformDescriptor::twitter(handle))
            }
        }
    }
}

async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.snapshot().into())
}

async fn connect(State(state): State<AppState>) -> Result<Json<SessionView>, HttpError> {
    let wallet = state.wallet.clone().ok_or_else(|| {
        HttpError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("no wallet available; set {WALLET_KEY_VAR}"),
        )
    })?;
    info!(address = %wallet.address(), "Connecting wallet");
    state.session.connect(wallet).await?;
    Ok(Json(state.session.snapshot().into()))
}

async fn disconnect(State(state): State<AppState>) -> Result<Json<SessionView>, HttpError> {
    state.session.disconnect().await?;
    Ok(Json(state.session.snapshot().into()))
}

async fn select_network(
    State(state): State<AppState>,
    Json(request): Json<NetworkRequest>,
) -> Result<Json<SessionView>, HttpError> {
    let network = request.network.trim();
    if network.is_empty() || network.len() > MAX_NETWORK_LEN {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("network must be 1..={MAX_NETWORK_LEN} characters"),
        ));
    }
    state.session.select_network(network.to_string()).await?;
    Ok(Json(state.session.snapshot().into()))
}

async fn bind(
    State(state): State<AppState>,
    Json(request): Json<BindRequest>,
) -> Result<(StatusCode, Json<SessionView>), HttpError> {
    let descriptor = request.into_descriptor()?;
    info!(platform = %descriptor.kind, "Binding requested");
    state.session.bind(descriptor).await?;
    Ok((StatusCode::ACCEPTED, Json(state.session.snapshot().into())))
}

/// Sends the held proof once the post carrying its signature is public.
async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SessionView>), HttpError> {
    info!(proof_location = %request.proof_location.trim(), "Published proof submitted");
    state.session.submit_published(request.proof_location).await?;
    Ok((StatusCode::ACCEPTED, Json(state.session.snapshot().into())))
}
