use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::proof::{IdentityBindingRequest, Platform, ProofSubmission, SignedProof};
use crate::proof::ProofClient;
use crate::signer::{SigningAdapter, SigningError, Wallet};

use super::{CHALLENGE_MESSAGE, FlowError, FlowState, PlatformDescriptor, SessionSnapshot};

/// A binding that passed pre-flight checks and is ready to run.
pub struct PreparedBinding {
    descriptor: PlatformDescriptor,
    identity: String,
    signer: SigningAdapter,
}

/// A signed proof that has not been sent to the proof service yet.
pub struct PendingSubmission {
    request: IdentityBindingRequest,
    submission: ProofSubmission,
}

/// Owns the session state and drives one binding attempt at a time.
pub struct Orchestrator {
    client: ProofClient,
    wallet: Option<Arc<dyn Wallet>>,
    /// Held while a published post is awaited.
    pending: Option<PendingSubmission>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Orchestrator {
    pub fn new(client: ProofClient, snapshot: watch::Sender<SessionSnapshot>) -> Self {
        Self {
            client,
            wallet: None,
            pending: None,
            snapshot,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> FlowState {
        self.snapshot.borrow().state
    }

    pub fn connect(&mut self, wallet: Arc<dyn Wallet>) {
        let address = wallet.address();
        info!(%address, "Wallet connected");
        self.discard_pending();
        self.wallet = Some(wallet);
        self.update(|snapshot| {
            snapshot.connection.connected = true;
            snapshot.connection.address = Some(address);
        });
    }

    pub fn disconnect(&mut self) {
        if self.wallet.take().is_some() {
            info!("Wallet disconnected");
        }
        self.discard_pending();
        self.update(|snapshot| {
            snapshot.connection.connected = false;
            snapshot.connection.address = None;
        });
    }

    pub fn select_network(&mut self, network: String) {
        info!(%network, "Network selected");
        self.update(|snapshot| snapshot.connection.network = Some(network));
    }

    /// Pre-flight checks. On success the attempt is reset and moved to
    /// `AwaitingSignature`; on failure the state is left untouched.
    pub fn begin(&mut self, descriptor: PlatformDescriptor) -> Result<PreparedBinding, FlowError> {
        let Some(wallet) = self.wallet.clone() else {
            warn!(platform = %descriptor.kind, "Binding requested without a connected wallet");
            return Err(FlowError::NotConnected);
        };
        let identity = descriptor.resolve_identity(&wallet.address())?;

        self.pending = None;
        let platform = descriptor.kind;
        let attempt_identity = identity.clone();
        self.update(move |snapshot| {
            snapshot.state = FlowState::Idle;
            snapshot.platform = Some(platform);
            snapshot.identity = Some(attempt_identity);
            snapshot.public_key = None;
            snapshot.verified = false;
            snapshot.error = None;
            snapshot.payload = None;
            snapshot.pending_post = None;
        });
        self.transition(FlowState::AwaitingSignature);

        Ok(PreparedBinding {
            descriptor,
            identity,
            signer: SigningAdapter::new(Some(wallet)),
        })
    }

    /// Runs a prepared binding. Platforms that publish a post stop at
    /// `AwaitingPublication`; the rest run to a terminal state.
    pub async fn execute(&mut self, binding: PreparedBinding) -> FlowState {
        let pending = match self.prepare(&binding).await {
            Ok(pending) => pending,
            Err(err) => return self.fail(binding.descriptor.kind, &binding.identity, err),
        };

        if binding.descriptor.publishes_post() {
            info!(
                platform = %binding.descriptor.kind,
                identity = %binding.identity,
                uuid = %pending.submission.uuid,
                "Proof post rendered, waiting for publication"
            );
            self.pending = Some(pending);
            self.transition(FlowState::AwaitingPublication);
            return FlowState::AwaitingPublication;
        }
        self.complete(pending).await
    }

    /// Takes the held proof once the post is out. On failure the proof stays
    /// held and the state is left untouched.
    pub fn begin_submission(&mut self, proof_location: &str) -> Result<PendingSubmission, FlowError> {
        if self.state() != FlowState::AwaitingPublication || self.pending.is_none() {
            return Err(FlowError::NothingToSubmit);
        }
        let location = proof_location.trim();
        if location.is_empty() {
            return Err(FlowError::MissingProofLocation);
        }
        let mut pending = self.pending.take().ok_or(FlowError::NothingToSubmit)?;
        pending.submission.proof_location = Some(location.to_string());
        Ok(pending)
    }

    /// Submits a signed proof and runs the attempt to a terminal state.
    pub async fn complete(&mut self, pending: PendingSubmission) -> FlowState {
        let PendingSubmission {
            request,
            submission,
        } = pending;
        match self.submit(&request, &submission).await {
            Ok(()) => {
                self.update(|snapshot| snapshot.verified = true);
                self.transition(FlowState::Verified);
                self.refresh_status(&request).await;
                FlowState::Verified
            }
            Err(err) => self.fail(request.platform, &request.identity, err),
        }
    }

    async fn prepare(&mut self, binding: &PreparedBinding) -> Result<PendingSubmission, FlowError> {
        let signer = &binding.signer;

        let challenge_signature = signer
            .sign(CHALLENGE_MESSAGE)
            .await
            .map_err(signing("challenge signature failed"))?;
        let recovered = signer
            .recover_public_key(CHALLENGE_MESSAGE, &challenge_signature)
            .map_err(signing("public key recovery failed"))?;
        if signer.connected_address().as_deref() != Some(recovered.address.as_str()) {
            return Err(FlowError::Signing {
                stage: "public key recovery failed",
                source: SigningError::InvalidSignature(format!(
                    "challenge was signed by {}, not the connected wallet",
                    recovered.address
                )),
            });
        }
        debug!(public_key = %recovered.public_key, "Recovered public key from challenge signature");

        let request = IdentityBindingRequest {
            platform: binding.descriptor.kind,
            identity: binding.identity.clone(),
            public_key: recovered.public_key,
        };
        let public_key = request.public_key.clone();
        self.update(move |snapshot| snapshot.public_key = Some(public_key));

        let payload = self
            .client
            .request_payload(&request)
            .await
            .map_err(proof("payload request failed"))?;
        debug!(
            uuid = %payload.uuid,
            created_at = ?payload.created_at_utc(),
            "Proof payload issued"
        );
        let issued = payload.clone();
        self.update(move |snapshot| snapshot.payload = Some(issued));
        self.transition(FlowState::PayloadRequested);

        self.transition(FlowState::AwaitingSecondSignature);
        let payload_signature = signer
            .sign(&payload.sign_payload)
            .await
            .map_err(signing("payload signature failed"))?;
        let signed = SignedProof::from_hex(payload, &payload_signature).map_err(|err| {
            FlowError::Signing {
                stage: "payload signature failed",
                source: SigningError::InvalidSignature(err.to_string()),
            }
        })?;
        let signature_base64 = signed.signature_base64();

        if binding.descriptor.publishes_post() {
            let post = signed.payload.render_post(&signature_base64);
            self.update(move |snapshot| snapshot.pending_post = Some(post));
        }

        let submission = ProofSubmission::for_payload(
            &request,
            &signed.payload,
            binding.descriptor.extra(&signature_base64),
            None,
        );
        Ok(PendingSubmission {
            request,
            submission,
        })
    }

    async fn submit(
        &mut self,
        request: &IdentityBindingRequest,
        submission: &ProofSubmission,
    ) -> Result<(), FlowError> {
        self.transition(FlowState::Submitting);
        self.client
            .submit_proof(submission)
            .await
            .map_err(proof("proof submission failed"))?;

        info!(
            platform = %request.platform,
            identity = %request.identity,
            uuid = %submission.uuid,
            "Proof accepted"
        );
        Ok(())
    }

    fn fail(&mut self, platform: Platform, identity: &str, err: FlowError) -> FlowState {
        warn!(%platform, %identity, "Binding failed: {err}");
        let message = err.to_string();
        self.update(move |snapshot| {
            snapshot.verified = false;
            snapshot.error = Some(message);
        });
        self.transition(FlowState::Failed);
        FlowState::Failed
    }

    /// A held proof belongs to the wallet that signed it.
    fn discard_pending(&mut self) {
        if self.pending.take().is_some() {
            info!("Discarding unpublished proof");
            self.update(|snapshot| snapshot.pending_post = None);
            self.transition(FlowState::Idle);
        }
    }

    /// One status query after a successful submission. A failed query keeps
    /// the previous status and only records the error.
    async fn refresh_status(&mut self, request: &IdentityBindingRequest) {
        match self
            .client
            .query_status(request.platform, &request.identity, true)
            .await
        {
            Ok(status) => {
                debug!(
                    identities = status.identities.len(),
                    listed = status.contains_valid_proof(request.platform, &request.identity),
                    "Avatar status refreshed"
                );
                self.update(move |snapshot| snapshot.avatar_status = Some(status));
            }
            Err(err) => {
                warn!("Avatar status query failed: {err}");
                let message = format!("status query failed: {err}");
                self.update(move |snapshot| snapshot.error = Some(message));
            }
        }
    }

    /// Republishes the snapshot without changing it.
    pub(super) fn touch(&self) {
        self.update(|_| {});
    }

    fn transition(&mut self, next: FlowState) {
        let previous = self.state();
        debug!(?previous, ?next, "Flow transition");
        self.update(move |snapshot| snapshot.state = next);
    }

    fn update(&self, apply: impl FnOnce(&mut SessionSnapshot)) {
        self.snapshot.send_modify(|snapshot| {
            apply(snapshot);
            snapshot.updated_at = Utc::now();
        });
    }
}

fn signing(stage: &'static str) -> impl FnOnce(SigningError) -> FlowError {
    move |source| FlowError::Signing { stage, source }
}

fn proof(stage: &'static str) -> impl FnOnce(crate::proof::ProofError) -> FlowError {
    move |source| FlowError::Proof { stage, source }
}
