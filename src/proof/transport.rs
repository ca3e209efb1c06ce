use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use super::ProofError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: ServiceMethod,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: String,
}

/// One request/response exchange with the proof service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ServiceRequest) -> Result<ServiceResponse, ProofError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ProofError> {
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ServiceRequest) -> Result<ServiceResponse, ProofError> {
        let builder = match request.method {
            ServiceMethod::Get => self.client.get(&request.url),
            ServiceMethod::Post => self.client.post(&request.url),
        };
        let mut builder = builder
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ServiceResponse { status, body })
    }
}
