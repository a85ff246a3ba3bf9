// Request/response orchestrator - turns approved disclosures into a sent response

use crate::engine::{NfcEngagementService, ProximityEngine, ResourceProvider};
use crate::events::TransferEventAdapter;
use crate::session::{PhaseTracker, SessionScope};
use crate::{
    AttemptId, DisclosedDocuments, ErrorContext, HostContext, ProximityError, ResponseResult,
    Result, SendRequestedDocumentsState,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One finished submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub attempt: AttemptId,
    pub state: SendRequestedDocumentsState,
}

/// Clears the in-flight flag when an attempt ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RequestOrchestrator {
    session_id: Uuid,
    engine: Arc<dyn ProximityEngine>,
    nfc: Arc<dyn NfcEngagementService>,
    resources: Arc<dyn ResourceProvider>,
    adapter: Arc<TransferEventAdapter>,
    scope: SessionScope,
    phase: PhaseTracker,
    disclosed: RwLock<Option<DisclosedDocuments>>,
    in_flight: AtomicBool,
    attempts: AtomicU64,
}

impl RequestOrchestrator {
    pub fn new(
        session_id: Uuid,
        engine: Arc<dyn ProximityEngine>,
        nfc: Arc<dyn NfcEngagementService>,
        resources: Arc<dyn ResourceProvider>,
        adapter: Arc<TransferEventAdapter>,
        scope: SessionScope,
        phase: PhaseTracker,
    ) -> Self {
        Self {
            session_id,
            engine,
            nfc,
            resources,
            adapter,
            scope,
            phase,
            disclosed: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }

    fn error_context(&self) -> ErrorContext {
        ErrorContext::new()
            .with_session_id(self.session_id)
            .with_verifier_name(self.adapter.verifier_name())
    }

    /// Begin QR engagement. Progress and failures arrive on the event stream.
    pub async fn start_qr_engagement(&self) {
        if self.scope.is_cancelled() {
            debug!("Session already stopped, not starting QR engagement");
            return;
        }

        self.adapter.ensure_registered();
        info!(session_id = %self.session_id, "Starting QR engagement");

        if let Err(e) = self.engine.start_qr_engagement().await {
            e.log_with_context(&self.error_context().with_info("start_qr_engagement"));
            let message = e
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| self.resources.generic_error_message());
            self.adapter.report_error(message);
        }
    }

    /// Enable or disable the NFC engagement service for a UI host
    pub fn toggle_nfc_engagement(&self, host: &HostContext, enable: bool) {
        if enable {
            self.adapter.ensure_registered();
        }

        let result = if enable {
            self.nfc.enable(host)
        } else {
            self.nfc.disable(host)
        };

        match result {
            Ok(()) => debug!(host = host.id(), enable, "NFC engagement toggled"),
            Err(e) => warn!(host = host.id(), enable, error = %e, "NFC engagement toggle failed"),
        }
    }

    /// Replace the holder-approved disclosures
    pub fn update_requested_documents(&self, documents: DisclosedDocuments) {
        debug!(documents = documents.len(), "Disclosed documents updated");
        *self.disclosed.write().unwrap_or_else(|p| p.into_inner()) = Some(documents);
    }

    pub fn disclosed_documents(&self) -> Option<DisclosedDocuments> {
        self.disclosed
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Build and transmit a response from the current disclosures.
    ///
    /// `None` means nothing was attempted or completed: no disclosures are
    /// set, another submission is in flight, or the session is (or gets)
    /// stopped.
    pub async fn send_requested_documents(&self) -> Option<SendRequestedDocumentsState> {
        self.submit().await.map(|submission| submission.state)
    }

    /// Same as `send_requested_documents`, keeping the attempt identifier
    pub async fn submit(&self) -> Option<Submission> {
        if self.scope.is_cancelled() {
            debug!("Session already stopped, ignoring submission");
            return None;
        }

        let Some(disclosed) = self.disclosed_documents() else {
            debug!("No disclosed documents set, nothing to submit");
            return None;
        };

        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!(session_id = %self.session_id, "Submission already in progress, ignoring duplicate");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let attempt = AttemptId(self.attempts.fetch_add(1, Ordering::SeqCst) + 1);
        let span = info_span!("submission", session_id = %self.session_id, %attempt);

        let cancelled = self.scope.token();
        async move {
            self.phase.advance(|phase| phase.on_submission_started());

            let result = tokio::select! {
                biased;
                _ = cancelled.cancelled() => Err(ProximityError::SessionTerminated),
                result = self.build_and_send(&disclosed) => result,
            };

            let state = match result {
                Ok(state) => state,
                Err(ProximityError::SessionTerminated) if self.scope.is_cancelled() => {
                    info!("Session stopped during submission, abandoning attempt");
                    return None;
                }
                Err(e) => {
                    e.log_with_context(&self.error_context().with_attempt_id(attempt));
                    SendRequestedDocumentsState::Failure(self.failure_message(&e))
                }
            };

            self.phase.advance(|phase| phase.on_submission(&state));
            info!(outcome = ?state, "Submission finished");
            Some(Submission { attempt, state })
        }
        .instrument(span)
        .await
    }

    async fn build_and_send(
        &self,
        disclosed: &DisclosedDocuments,
    ) -> Result<SendRequestedDocumentsState> {
        match self.engine.create_response(disclosed).await? {
            ResponseResult::Failure(detail) => {
                // Engine detail is not shown to the holder
                warn!(detail = %detail, "Engine failed to build response");
                Ok(SendRequestedDocumentsState::Failure(
                    self.resources.generic_error_message(),
                ))
            }
            ResponseResult::UserAuthRequired => {
                info!("User authentication required before response can be built");
                Ok(SendRequestedDocumentsState::UserAuthenticationRequired)
            }
            ResponseResult::Response(bytes) => {
                if self.scope.is_cancelled() {
                    return Err(ProximityError::SessionTerminated);
                }
                info!(bytes = bytes.len(), "Sending response");
                self.engine.send_response(bytes).await?;
                Ok(SendRequestedDocumentsState::RequestSent)
            }
        }
    }

    /// Message for a failed attempt: the error's own detail or the generic text
    pub fn failure_message(&self, error: &ProximityError) -> String {
        error
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| self.resources.generic_error_message())
    }

    pub(crate) fn generic_error_message(&self) -> String {
        self.resources.generic_error_message()
    }

    pub(crate) fn error_context_for(&self, attempt: AttemptId) -> ErrorContext {
        self.error_context().with_attempt_id(attempt)
    }
}
