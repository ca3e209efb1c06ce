use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::signer::Wallet;

use super::{FlowError, Orchestrator, PlatformDescriptor, SessionSnapshot};

const EVENT_QUEUE_DEPTH: usize = 32;

type Applied = oneshot::Sender<()>;
type Accepted = oneshot::Sender<Result<(), FlowError>>;

enum SessionEvent {
    Connect { wallet: Arc<dyn Wallet>, done: Applied },
    Disconnect { done: Applied },
    SelectNetwork { network: String, done: Applied },
    Bind {
        descriptor: PlatformDescriptor,
        accepted: Accepted,
    },
    SubmitPublished {
        proof_location: String,
        accepted: Accepted,
    },
}

/// Cloneable front door to the session task: events in, snapshots out.
///
/// Connection events return once applied. Attempts (`bind`,
/// `submit_published`) return once pre-flight checks pass and keep running in
/// the session task; while one runs every other event is rejected with
/// `Busy`. An event already queued when an attempt starts waits for it.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    busy: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn spawn(orchestrator: Orchestrator, shutdown: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let (events, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let snapshots = orchestrator.subscribe();
        let busy = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_session(
            orchestrator,
            receiver,
            Arc::clone(&busy),
            shutdown,
        ));
        (
            Self {
                events,
                snapshots,
                busy,
            },
            task,
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn connect(&self, wallet: Arc<dyn Wallet>) -> Result<(), FlowError> {
        self.apply(|done| SessionEvent::Connect { wallet, done })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), FlowError> {
        self.apply(|done| SessionEvent::Disconnect { done }).await
    }

    pub async fn select_network(&self, network: String) -> Result<(), FlowError> {
        self.apply(|done| SessionEvent::SelectNetwork { network, done })
            .await
    }

    /// Starts a binding attempt.
    pub async fn bind(&self, descriptor: PlatformDescriptor) -> Result<(), FlowError> {
        self.start(|accepted| SessionEvent::Bind {
            descriptor,
            accepted,
        })
        .await
    }

    /// Submits the held proof once its post is published at `proof_location`.
    pub async fn submit_published(&self, proof_location: String) -> Result<(), FlowError> {
        self.start(|accepted| SessionEvent::SubmitPublished {
            proof_location,
            accepted,
        })
        .await
    }

    /// Waits until no attempt is in flight and returns the settled snapshot.
    #[cfg(test)]
    pub(crate) async fn settled(&self) -> Result<SessionSnapshot, FlowError> {
        let mut snapshots = self.snapshots.clone();
        loop {
            if !self.busy.load(Ordering::Acquire) {
                return Ok(snapshots.borrow_and_update().clone());
            }
            snapshots
                .changed()
                .await
                .map_err(|_| FlowError::SessionClosed)?;
        }
    }

    async fn apply(&self, event: impl FnOnce(Applied) -> SessionEvent) -> Result<(), FlowError> {
        if self.busy.load(Ordering::Acquire) {
            return Err(FlowError::Busy);
        }
        let (done, applied) = oneshot::channel();
        self.send(event(done)).await?;
        applied.await.map_err(|_| FlowError::SessionClosed)
    }

    async fn start(&self, event: impl FnOnce(Accepted) -> SessionEvent) -> Result<(), FlowError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FlowError::Busy);
        }

        let (accepted, verdict) = oneshot::channel();
        if let Err(err) = self.send(event(accepted)).await {
            self.busy.store(false, Ordering::Release);
            return Err(err);
        }

        verdict.await.map_err(|_| FlowError::SessionClosed)?
    }

    async fn send(&self, event: SessionEvent) -> Result<(), FlowError> {
        self.events
            .send(event)
            .await
            .map_err(|_| FlowError::SessionClosed)
    }
}

async fn run_session(
    mut orchestrator: Orchestrator,
    mut events: mpsc::Receiver<SessionEvent>,
    busy: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Session task started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                handle_event(&mut orchestrator, event, &busy).await;
            }
        }
    }
    info!("Session task stopped");
}

async fn handle_event(orchestrator: &mut Orchestrator, event: SessionEvent, busy: &AtomicBool) {
    match event {
        SessionEvent::Connect { wallet, done } => {
            orchestrator.connect(wallet);
            let _ = done.send(());
        }
        SessionEvent::Disconnect { done } => {
            orchestrator.disconnect();
            let _ = done.send(());
        }
        SessionEvent::SelectNetwork { network, done } => {
            orchestrator.select_network(network);
            let _ = done.send(());
        }
        SessionEvent::Bind {
            descriptor,
            accepted,
        } => match orchestrator.begin(descriptor) {
            Ok(prepared) => {
                let _ = accepted.send(Ok(()));
                let outcome = orchestrator.execute(prepared).await;
                debug!(?outcome, "Binding attempt finished");
                release(orchestrator, busy);
            }
            Err(err) => {
                busy.store(false, Ordering::Release);
                let _ = accepted.send(Err(err));
            }
        },
        SessionEvent::SubmitPublished {
            proof_location,
            accepted,
        } => match orchestrator.begin_submission(&proof_location) {
            Ok(pending) => {
                let _ = accepted.send(Ok(()));
                let outcome = orchestrator.complete(pending).await;
                debug!(?outcome, "Published proof submitted");
                release(orchestrator, busy);
            }
            Err(err) => {
                busy.store(false, Ordering::Release);
                let _ = accepted.send(Err(err));
            }
        },
    }
}

fn release(orchestrator: &Orchestrator, busy: &AtomicBool) {
    busy.store(false, Ordering::Release);
    // Wake `settled` waiters even if the last transition raced the flag.
    orchestrator.touch();
}
