//! Proof flow: binds a wallet-controlled key to a platform identity on a
//! next.id DID.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::{normalize_handle, sanitize_wallet_address};
use crate::models::proof::{AvatarStatus, Platform, ProofExtra, ProofPayload};
use crate::proof::ProofError;
use crate::signer::SigningError;

mod orchestrator;
mod session;

pub use orchestrator::Orchestrator;
pub use session::SessionHandle;

/// Fixed challenge signed to recover the wallet's public key.
pub const CHALLENGE_MESSAGE: &str = "next.id rocks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    AwaitingSignature,
    PayloadRequested,
    AwaitingSecondSignature,
    /// Post rendered and signed proof held until the post is published.
    AwaitingPublication,
    Submitting,
    Verified,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Verified | FlowState::Failed)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal() && *self != FlowState::Idle
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("no wallet is connected")]
    NotConnected,
    #[error("a binding attempt is already in progress")]
    Busy,
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("twitter proofs require the id of the published post")]
    MissingProofLocation,
    #[error("no signed proof is waiting for publication")]
    NothingToSubmit,
    #[error("{stage}: {source}")]
    Signing {
        stage: &'static str,
        source: SigningError,
    },
    #[error("{stage}: {source}")]
    Proof {
        stage: &'static str,
        source: ProofError,
    },
    #[error("session task has stopped")]
    SessionClosed,
}

/// Where the identity string of a binding comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    ConnectedAddress,
    Handle(String),
}

/// Everything that differs between the ethereum and twitter variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub kind: Platform,
    pub identity: IdentitySource,
}

impl PlatformDescriptor {
    pub fn ethereum() -> Self {
        Self {
            kind: Platform::Ethereum,
            identity: IdentitySource::ConnectedAddress,
        }
    }

    pub fn twitter(handle: impl Into<String>) -> Self {
        Self {
            kind: Platform::Twitter,
            identity: IdentitySource::Handle(handle.into()),
        }
    }

    pub fn resolve_identity(&self, connected_address: &str) -> Result<String, FlowError> {
        match &self.identity {
            IdentitySource::ConnectedAddress => sanitize_wallet_address(connected_address)
                .map_err(|err| FlowError::InvalidIdentity(err.to_string())),
            IdentitySource::Handle(handle) => {
                normalize_handle(handle).map_err(|err| FlowError::InvalidIdentity(err.to_string()))
            }
        }
    }

    pub fn extra(&self, signature_base64: &str) -> ProofExtra {
        match self.kind {
            // Persona and wallet are the same key here, so both slots carry it.
            Platform::Ethereum => ProofExtra {
                signatures: vec![signature_base64.to_string(), signature_base64.to_string()],
            },
            Platform::Twitter => ProofExtra::default(),
        }
    }

    /// The signed proof is posted publicly and submitted only once the post
    /// exists.
    pub fn publishes_post(&self) -> bool {
        self.kind == Platform::Twitter
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub connected: bool,
    pub address: Option<String>,
    pub network: Option<String>,
}

/// Read-only view of the session published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub connection: Connection,
    pub state: FlowState,
    pub platform: Option<Platform>,
    pub identity: Option<String>,
    pub public_key: Option<String>,
    pub verified: bool,
    pub error: Option<String>,
    pub payload: Option<ProofPayload>,
    pub pending_post: Option<String>,
    pub avatar_status: Option<AvatarStatus>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            connection: Connection::default(),
            state: FlowState::Idle,
            platform: None,
            identity: None,
            public_key: None,
            verified: false,
            error: None,
            payload: None,
            pending_post: None,
            avatar_status: None,
            updated_at: Utc::now(),
        }
    }
}

impl SessionSnapshot {
    pub fn outcome_message(&self) -> Option<String> {
        let status = self.avatar_status.as_ref()?;
        let platform = self.platform.map(|p| p.as_str()).unwrap_or("platform");
        if self.verified && status.has_identities() {
            Some(format!(
                "Your {platform} identity has been added to your next.id DID"
            ))
        } else if self.verified {
            Some("No Avatar / Decentralised (DID) found.".to_string())
        } else {
            Some(format!("Your {platform} identity was not added successfully"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_pending_states() {
        assert!(FlowState::Verified.is_terminal());
        assert!(FlowState::Failed.is_terminal());
        assert!(!FlowState::Idle.is_pending());
        assert!(FlowState::Submitting.is_pending());
        assert!(FlowState::AwaitingPublication.is_pending());
        assert!(!FlowState::Verified.is_pending());
    }

    #[test]
    fn ethereum_descriptor_uses_connected_address() {
        let descriptor = PlatformDescriptor::ethereum();
        let identity = descriptor
            .resolve_identity("0x2C7536E3605D9C16a7a3D7b1898e529396a65c23")
            .unwrap();
        assert_eq!(identity, "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23");
        assert_eq!(descriptor.extra("c2ln").signatures, vec!["c2ln", "c2ln"]);
        assert!(!descriptor.publishes_post());
    }

    #[test]
    fn twitter_descriptor_normalizes_handle() {
        let descriptor = PlatformDescriptor::twitter("@Alice");
        assert_eq!(descriptor.resolve_identity("0xignored").unwrap(), "alice");
        assert!(descriptor.extra("c2ln").signatures.is_empty());
        assert!(descriptor.publishes_post());

        let bad = PlatformDescriptor::twitter("not a handle");
        assert!(matches!(
            bad.resolve_identity(""),
            Err(FlowError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn outcome_message_tracks_verification() {
        let mut snapshot = SessionSnapshot::default();
        assert!(snapshot.outcome_message().is_none());

        snapshot.platform = Some(Platform::Ethereum);
        snapshot.avatar_status = Some(AvatarStatus::default());
        assert_eq!(
            snapshot.outcome_message().unwrap(),
            "Your ethereum identity was not added successfully"
        );

        snapshot.verified = true;
        assert_eq!(
            snapshot.outcome_message().unwrap(),
            "No Avatar / Decentralised (DID) found."
        );
    }
}
