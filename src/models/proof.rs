use std::fmt;

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::decode_hex_signature;

pub const ACTION_CREATE: &str = "create";
pub const SIGNATURE_PLACEHOLDER: &str = "%SIG_BASE64%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ethereum,
    Twitter,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ethereum => "ethereum",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One binding attempt's subject. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBindingRequest {
    pub platform: Platform,
    pub identity: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadRequest<'a> {
    pub action: &'static str,
    pub platform: Platform,
    pub identity: &'a str,
    pub public_key: &'a str,
}

impl<'a> From<&'a IdentityBindingRequest> for PayloadRequest<'a> {
    fn from(request: &'a IdentityBindingRequest) -> Self {
        Self {
            action: ACTION_CREATE,
            platform: request.platform,
            identity: &request.identity,
            public_key: &request.public_key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    #[serde(default)]
    pub default: String,
    #[serde(rename = "en_US", default)]
    pub en_us: String,
    #[serde(rename = "zh_CN", default)]
    pub zh_cn: String,
}

/// Server-issued challenge for a single binding attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    #[serde(default)]
    pub post_content: PostContent,
    pub sign_payload: String,
    pub uuid: String,
    pub created_at: String,
}

impl ProofPayload {
    /// `created_at` is unix seconds encoded as a string.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_unix_seconds(&self.created_at)
    }

    /// Post body with the base64 signature substituted in.
    pub fn render_post(&self, signature_base64: &str) -> String {
        self.post_content
            .default
            .replace(SIGNATURE_PLACEHOLDER, signature_base64)
    }
}

/// A payload together with the wallet signature over its `sign_payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProof {
    pub payload: ProofPayload,
    pub signature: Vec<u8>,
}

impl SignedProof {
    /// Takes the wallet's `0x`-prefixed hex signature over `payload.sign_payload`.
    pub fn from_hex(payload: ProofPayload, signature: &str) -> Result<Self> {
        let signature = decode_hex_signature(signature)?;
        Ok(Self { payload, signature })
    }

    pub fn signature_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.signature)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofExtra {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub action: String,
    pub platform: Platform,
    pub identity: String,
    pub public_key: String,
    pub extra: ProofExtra,
    pub uuid: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_location: Option<String>,
}

impl ProofSubmission {
    /// Echoes the payload's `uuid` and `created_at` verbatim.
    pub fn for_payload(
        request: &IdentityBindingRequest,
        payload: &ProofPayload,
        extra: ProofExtra,
        proof_location: Option<String>,
    ) -> Self {
        Self {
            action: ACTION_CREATE.to_string(),
            platform: request.platform,
            identity: request.identity.clone(),
            public_key: request.public_key.clone(),
            extra,
            uuid: payload.uuid.clone(),
            created_at: payload.created_at.clone(),
            proof_location,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(rename = "per", default)]
    pub per_page: u64,
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub next: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub platform: String,
    pub identity: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_checked_at: String,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub invalid_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub avatar: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub activated_at: String,
    #[serde(default)]
    pub last_arweave_id: String,
    #[serde(default)]
    pub proofs: Vec<ProofRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarStatus {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(rename = "ids", default)]
    pub identities: Vec<IdentityRecord>,
}

impl AvatarStatus {
    pub fn has_identities(&self) -> bool {
        !self.identities.is_empty()
    }

    /// Whether any returned DID carries a valid proof for `platform`/`identity`.
    pub fn contains_valid_proof(&self, platform: Platform, identity: &str) -> bool {
        self.identities.iter().any(|record| {
            record.proofs.iter().any(|proof| {
                proof.is_valid
                    && proof.platform == platform.as_str()
                    && proof.identity.eq_ignore_ascii_case(identity)
            })
        })
    }
}

fn parse_unix_seconds(value: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = value.trim().parse().ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> ProofPayload {
        serde_json::from_value(json!({
            "post_content": {
                "default": "Verifying my next.id account.\nSig: %SIG_BASE64%",
                "en_US": "Verifying my next.id account.\nSig: %SIG_BASE64%",
                "zh_CN": "验证我的 next.id 账户。\nSig: %SIG_BASE64%"
            },
            "sign_payload": "{\"action\":\"create\"}",
            "uuid": "7d5c3a4e-0f64-4b0f-8b5d-3c5e5b1c2a11",
            "created_at": "1647503071"
        }))
        .expect("payload decodes")
    }

    #[test]
    fn payload_decodes_and_parses_timestamp() {
        let payload = sample_payload();
        assert_eq!(payload.uuid, "7d5c3a4e-0f64-4b0f-8b5d-3c5e5b1c2a11");
        let created = payload.created_at_utc().expect("timestamp parses");
        assert_eq!(created.timestamp(), 1_647_503_071);
    }

    #[test]
    fn signed_proof_base64_roundtrips_to_raw_bytes() {
        let raw: Vec<u8> = (0u8..65).collect();
        let signed = SignedProof::from_hex(sample_payload(), &format!("0x{}", hex::encode(&raw)))
            .expect("hex signature decodes");
        assert_eq!(signed.signature, raw);

        let encoded = signed.signature_base64();
        assert_eq!(BASE64_STANDARD.decode(encoded).unwrap(), raw);
    }

    #[test]
    fn signature_converts_to_known_base64() {
        let signed = SignedProof::from_hex(sample_payload(), "0xdeadbeef").unwrap();
        assert_eq!(signed.signature_base64(), "3q2+7w==");
        assert!(SignedProof::from_hex(sample_payload(), "0x").is_err());
    }

    #[test]
    fn post_rendering_substitutes_signature() {
        let payload = sample_payload();
        let post = payload.render_post("c2lnbmF0dXJl");
        assert!(post.ends_with("Sig: c2lnbmF0dXJl"));
        assert!(!post.contains(SIGNATURE_PLACEHOLDER));
    }

    #[test]
    fn submission_echoes_payload_and_omits_empty_fields() {
        let payload = sample_payload();
        let request = IdentityBindingRequest {
            platform: Platform::Twitter,
            identity: "alice".to_string(),
            public_key: "0x04ab".to_string(),
        };
        let submission = ProofSubmission::for_payload(
            &request,
            &payload,
            ProofExtra::default(),
            Some("1504234585236111360".to_string()),
        );
        let body = serde_json::to_value(&submission).unwrap();
        assert_eq!(body["action"], "create");
        assert_eq!(body["platform"], "twitter");
        assert_eq!(body["uuid"], payload.uuid);
        assert_eq!(body["created_at"], payload.created_at);
        assert_eq!(body["extra"], json!({}));
        assert_eq!(body["proof_location"], "1504234585236111360");

        let ethereum = ProofSubmission::for_payload(
            &IdentityBindingRequest {
                platform: Platform::Ethereum,
                ..request
            },
            &payload,
            ProofExtra {
                signatures: vec!["a".into(), "a".into()],
            },
            None,
        );
        let body = serde_json::to_value(&ethereum).unwrap();
        assert_eq!(body["extra"]["signatures"], json!(["a", "a"]));
        assert!(body.get("proof_location").is_none());
    }

    #[test]
    fn avatar_status_decodes_wire_names() {
        let status: AvatarStatus = serde_json::from_value(json!({
            "pagination": {"total": 1, "per": 20, "current": 1, "next": 0},
            "ids": [{
                "avatar": "0x028c3cda474361179d653c41a62f6bbb07265d6e4a3cdea2dc8e6c4e4e0f5cd1a3",
                "persona": "0x028c3cda474361179d653c41a62f6bbb07265d6e4a3cdea2dc8e6c4e4e0f5cd1a3",
                "activated_at": "1647503071",
                "last_arweave_id": "",
                "proofs": [{
                    "platform": "ethereum",
                    "identity": "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
                    "created_at": "1647503071",
                    "last_checked_at": "1647503075",
                    "is_valid": true,
                    "invalid_reason": ""
                }]
            }]
        }))
        .expect("status decodes");

        assert_eq!(status.pagination.per_page, 20);
        assert!(status.has_identities());
        assert!(status.contains_valid_proof(
            Platform::Ethereum,
            "0x2C7536E3605D9C16A7A3D7B1898E529396A65C23"
        ));
        assert!(!status.contains_valid_proof(Platform::Twitter, "alice"));
        assert_eq!(status.identities[0].proofs[0].last_checked_at, "1647503075");
    }
}
