use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ProofError, ServiceMethod, ServiceRequest, ServiceResponse, Transport};

/// Transport that records every request and replays queued responses in order.
#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<ServiceRequest>>,
    responses: Mutex<VecDeque<ServiceResponse>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        self.push_text(status, &body.to_string());
    }

    pub(crate) fn push_text(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(ServiceResponse {
            status,
            body: body.to_string(),
        });
    }

    pub(crate) fn calls(&self) -> Vec<ServiceRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, method: ServiceMethod, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && url_path(&call.url) == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ServiceRequest) -> Result<ServiceResponse, ProofError> {
        self.calls.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ServiceResponse {
                status: 599,
                body: "no response queued".to_string(),
            });
        Ok(response)
    }
}

fn url_path(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_default()
}

pub(crate) fn payload_json() -> Value {
    json!({
        "post_content": {
            "default": "🎭 Verifying my next.id persona.\n%SIG_BASE64%",
            "en_US": "🎭 Verifying my next.id persona.\n%SIG_BASE64%",
            "zh_CN": "🎭 正在验证我的 next.id 身份。\n%SIG_BASE64%"
        },
        "sign_payload": "{\"action\":\"create\",\"created_at\":\"1647503071\",\"identity\":\"0x2c7536e3605d9c16a7a3d7b1898e529396a65c23\",\"platform\":\"ethereum\",\"prev\":null,\"uuid\":\"3c4d8ab8-31ae-4b9d-8c37-1e1d0f8a51a7\"}",
        "uuid": "3c4d8ab8-31ae-4b9d-8c37-1e1d0f8a51a7",
        "created_at": "1647503071"
    })
}

pub(crate) fn avatar_status_json() -> Value {
    json!({
        "pagination": {"total": 1, "per": 20, "current": 1, "next": 0},
        "ids": [{
            "avatar": "0x04c7cacde73af939c35d527b34e0556ea84bab27e6c0ed7c6c59be70f6d2db59c206b23529977117dc8a5d61fa848f94950422b79d1c142bcf623862e49f9e6575",
            "persona": "0x04c7cacde73af939c35d527b34e0556ea84bab27e6c0ed7c6c59be70f6d2db59c206b23529977117dc8a5d61fa848f94950422b79d1c142bcf623862e49f9e6575",
            "activated_at": "1647503071",
            "last_arweave_id": "",
            "proofs": [{
                "platform": "ethereum",
                "identity": "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
                "created_at": "1647503071",
                "last_checked_at": "1647503071",
                "is_valid": true,
                "invalid_reason": ""
            }]
        }]
    })
}
