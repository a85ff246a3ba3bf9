// Presentation session controller - owns one proximity presentation end to end

use crate::broadcaster::EventSubscription;
use crate::engine::{NfcEngagementService, ProximityEngine, ResourceProvider};
use crate::events::TransferEventAdapter;
use crate::orchestrator::RequestOrchestrator;
use crate::pipeline::{mapped_callback_states, ObservationPipeline};
use crate::session::{PhaseTracker, SessionPhase, SessionScope};
use crate::{
    DisclosedDocuments, HostContext, ProximityState, ResponseReceivedState,
    SendRequestedDocumentsState, TransferEvent,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use shared::config::PresentationConfig;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Controller of a single proximity presentation session
///
/// Created when the holder starts a presentation flow. Stopping it (or
/// dropping it) cancels the session scope, which removes the engine listener,
/// stops the engine and ends every event subscription.
pub struct PresentationController {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    engine: Arc<dyn ProximityEngine>,
    scope: SessionScope,
    phase: PhaseTracker,
    adapter: Arc<TransferEventAdapter>,
    orchestrator: Arc<RequestOrchestrator>,
    pipeline: ObservationPipeline,
}

impl PresentationController {
    pub fn new(
        engine: Arc<dyn ProximityEngine>,
        nfc: Arc<dyn NfcEngagementService>,
        resources: Arc<dyn ResourceProvider>,
        config: &PresentationConfig,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let scope = SessionScope::new();
        let phase = PhaseTracker::new();

        let adapter = Arc::new(TransferEventAdapter::new(
            Arc::clone(&engine),
            scope.clone(),
            phase.clone(),
            config.event_channel_capacity,
        ));
        let orchestrator = Arc::new(RequestOrchestrator::new(
            session_id,
            Arc::clone(&engine),
            nfc,
            resources,
            Arc::clone(&adapter),
            scope.clone(),
            phase.clone(),
        ));
        let pipeline = ObservationPipeline::new(
            Arc::clone(&orchestrator),
            Arc::clone(&adapter),
            phase.clone(),
            config.ack_timeout(),
        );

        let terminated = phase.clone();
        scope.on_cancel(move || terminated.terminate());

        info!(session_id = %session_id, "Presentation session created");

        Self {
            session_id,
            started_at: Utc::now(),
            engine,
            scope,
            phase,
            adapter,
            orchestrator,
            pipeline,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    pub fn verifier_name(&self) -> Option<String> {
        self.adapter.verifier_name()
    }

    pub fn disclosed_documents(&self) -> Option<DisclosedDocuments> {
        self.orchestrator.disclosed_documents()
    }

    pub fn last_event(&self) -> Option<TransferEvent> {
        self.adapter.last_event()
    }

    /// Subscribe to the shared transfer event stream
    pub fn subscribe(&self) -> EventSubscription<TransferEvent> {
        self.adapter.subscribe()
    }

    pub fn events(&self) -> impl Stream<Item = TransferEvent> + Send + 'static {
        self.adapter.events()
    }

    pub async fn start_qr_engagement(&self) {
        self.orchestrator.start_qr_engagement().await
    }

    pub fn toggle_nfc_engagement(&self, host: &HostContext, enable: bool) {
        self.orchestrator.toggle_nfc_engagement(host, enable)
    }

    pub fn update_requested_documents(&self, documents: DisclosedDocuments) {
        self.orchestrator.update_requested_documents(documents)
    }

    pub async fn send_requested_documents(&self) -> Option<SendRequestedDocumentsState> {
        self.orchestrator.send_requested_documents().await
    }

    /// Terminal acknowledgments from the shared event stream
    pub fn mapped_callback_states(
        &self,
    ) -> impl Stream<Item = ResponseReceivedState> + Send + 'static {
        mapped_callback_states(self.adapter.subscribe())
    }

    pub async fn observe_sent_documents_request(&self) -> Option<ProximityState> {
        self.pipeline.observe_sent_documents_request().await
    }

    /// Stop the presentation and tear the session down. Safe to call repeatedly.
    pub fn stop_presentation(&self) {
        if let Err(e) = self.engine.stop_presentation() {
            warn!(session_id = %self.session_id, error = %e, "Engine stop failed, continuing teardown");
        }

        if self.scope.cancel() {
            info!(session_id = %self.session_id, "Presentation session stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Execution context of this session, for tasks that must end with it
    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }
}

impl Drop for PresentationController {
    fn drop(&mut self) {
        if !self.scope.is_cancelled() {
            self.stop_presentation();
        }
    }
}
