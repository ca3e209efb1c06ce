//! Client for the next.id proof service REST API.

use std::sync::Arc;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::proof::{
    AvatarStatus, IdentityBindingRequest, PayloadRequest, Platform, ProofPayload, ProofSubmission,
};

mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use transport::{ReqwestTransport, ServiceMethod, ServiceRequest, ServiceResponse, Transport};

const PAYLOAD_PATH: &str = "/v1/proof/payload";
const PROOF_PATH: &str = "/v1/proof";
const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("proof service base URL is not configured")]
    ConfigMissing,
    #[error("proof service base URL is invalid: {0}")]
    InvalidUrl(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("proof service returned status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode proof service response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ProofClient {
    base_url: Option<String>,
    transport: Arc<dyn Transport>,
}

impl ProofClient {
    pub fn new(base_url: Option<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url,
            transport,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url().is_ok()
    }

    /// Asks the service for the payload this key must sign for `request`.
    pub async fn request_payload(
        &self,
        request: &IdentityBindingRequest,
    ) -> Result<ProofPayload, ProofError> {
        let url = self.endpoint(PAYLOAD_PATH)?;
        let body = serde_json::to_value(PayloadRequest::from(request))?;
        debug!(
            platform = %request.platform,
            identity = %request.identity,
            "Requesting proof payload"
        );

        let response = self
            .transport
            .execute(ServiceRequest {
                method: ServiceMethod::Post,
                url: url.to_string(),
                body: Some(body),
            })
            .await?;

        match response.status {
            200 => decode_body(&response),
            404 => Err(ProofError::NotFound(format!(
                "no payload for {} identity {}",
                request.platform, request.identity
            ))),
            _ => Err(service_error(&response)),
        }
    }

    /// Submits a signed proof. Succeeds exactly when the service answers 201.
    pub async fn submit_proof(&self, submission: &ProofSubmission) -> Result<(), ProofError> {
        let url = self.endpoint(PROOF_PATH)?;
        let body = serde_json::to_value(submission)?;
        debug!(
            platform = %submission.platform,
            identity = %submission.identity,
            uuid = %submission.uuid,
            "Submitting proof"
        );

        let response = self
            .transport
            .execute(ServiceRequest {
                method: ServiceMethod::Post,
                url: url.to_string(),
                body: Some(body),
            })
            .await?;

        if response.status == 201 {
            Ok(())
        } else {
            Err(service_error(&response))
        }
    }

    pub async fn query_status(
        &self,
        platform: Platform,
        identity: &str,
        exact: bool,
    ) -> Result<AvatarStatus, ProofError> {
        let base = self.base_url()?;
        let exact = if exact { "true" } else { "false" };
        let url = Url::parse_with_params(
            &format!("{base}{PROOF_PATH}"),
            &[
                ("platform", platform.as_str()),
                ("identity", identity),
                ("exact", exact),
            ],
        )
        .map_err(|err| ProofError::InvalidUrl(err.to_string()))?;

        let response = self
            .transport
            .execute(ServiceRequest {
                method: ServiceMethod::Get,
                url: url.to_string(),
                body: None,
            })
            .await?;

        if response.status == 200 {
            decode_body(&response)
        } else {
            Err(service_error(&response))
        }
    }

    fn base_url(&self) -> Result<&str, ProofError> {
        let base = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ProofError::ConfigMissing)?;
        Ok(base.trim_end_matches('/'))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProofError> {
        let base = self.base_url()?;
        Url::parse(&format!("{base}{path}")).map_err(|err| ProofError::InvalidUrl(err.to_string()))
    }
}

fn decode_body<T: DeserializeOwned>(response: &ServiceResponse) -> Result<T, ProofError> {
    Ok(serde_json::from_str(&response.body)?)
}

fn service_error(response: &ServiceResponse) -> ProofError {
    let message = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate(&response.body));
    let message = if message.is_empty() {
        "empty response body".to_string()
    } else {
        message
    };
    warn!(status = response.status, "Proof service error: {message}");
    ProofError::Service {
        status: response.status,
        message,
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_LEN).collect()
}
