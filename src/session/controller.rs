// =============================================================================
// Session Controller — owns at most one in-flight Analysis Engine run
// =============================================================================
//
// One instance per live client session. Implements cancel-on-switch ("if a
// current run exists, cancel it and wait for its cancellation to settle
// before starting a new one") and idle/close teardown. The outbound emitter
// is single-writer: only the Controller's own run driver task ever sends on
// it, serialized by the `current_run` lock around every spawn.
// =============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::engine::{AnalysisEngine, RunOutcome};
use crate::portfolio::repository::validate_ticker;
use crate::rng::SharedRng;
use crate::session::protocol::{InboundMessage, OutboundMessage};
use crate::session::registry::SessionRegistry;
use crate::store::Gateway;

struct RunHandle {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<RunOutcome>,
}

pub struct SessionController<G: Gateway + 'static> {
    session_id: String,
    engine: Arc<AnalysisEngine<G>>,
    rng: Arc<SharedRng>,
    registry: Arc<SessionRegistry<G>>,
    outbound: mpsc::Sender<OutboundMessage>,
    current_run: Mutex<Option<RunHandle>>,
}

impl<G: Gateway + 'static> SessionController<G> {
    pub fn new(
        session_id: String,
        engine: Arc<AnalysisEngine<G>>,
        rng: Arc<SharedRng>,
        registry: Arc<SessionRegistry<G>>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            session_id,
            engine,
            rng,
            registry,
            outbound,
            current_run: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle one raw inbound frame. Malformed JSON or an unknown `action`
    /// both land in the protocol-error path: one `error` frame, connection
    /// stays open.
    pub async fn handle_inbound_raw(&self, raw: &str) {
        match serde_json::from_str::<InboundMessage>(raw) {
            Ok(InboundMessage::Analyze { ticker }) => self.handle_analyze(ticker).await,
            Err(e) => {
                debug!(session_id = %self.session_id, error = %e, "malformed inbound message");
                self.send_error("unrecognized or malformed message".to_string())
                    .await;
            }
        }
    }

    async fn handle_analyze(&self, ticker: String) {
        if let Err(e) = validate_ticker(&ticker) {
            self.send_error(e.to_string()).await;
            return;
        }

        // Cancel-on-switch: an identical-ticker re-request also
        // cancels-and-restarts, for uniformity (see DESIGN.md).
        self.cancel_current_and_wait().await;

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let run_seed = self.rng.next_run_seed();
        let engine = self.engine.clone();
        let outbound = self.outbound.clone();
        let session_id = self.session_id.clone();

        let join = tokio::spawn(async move {
            engine
                .run(&session_id, &ticker, outbound, run_cancel, run_seed)
                .await
        });

        *self.current_run.lock().await = Some(RunHandle { cancel, join });
    }

    /// Cancel the current run (if any) and wait for it to fully settle:
    /// every metric task released, nothing further will be emitted on this
    /// session by that run.
    async fn cancel_current_and_wait(&self) {
        let handle = self.current_run.lock().await.take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            match handle.join.await {
                Ok(outcome) => {
                    debug!(session_id = %self.session_id, outcome = ?outcome, "prior run settled");
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "prior run driver task panicked");
                }
            }
        }
    }

    /// Cancel the current run and wait for settlement, then remove this
    /// session from the registry. Called on connection close or idle
    /// timeout.
    pub async fn teardown(&self) {
        self.cancel_current_and_wait().await;
        self.registry.remove(&self.session_id);
        info!(session_id = %self.session_id, "session controller torn down");
    }

    async fn send_error(&self, message: String) {
        let _ = self.outbound.send(OutboundMessage::Error { message }).await;
    }
}
