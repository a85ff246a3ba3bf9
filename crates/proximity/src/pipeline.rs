// Combined observation pipeline - correlates a submission with the verifier's acknowledgment

use crate::broadcaster::EventSubscription;
use crate::events::{AcknowledgmentWatch, TransferEventAdapter};
use crate::orchestrator::{RequestOrchestrator, Submission};
use crate::session::PhaseTracker;
use crate::{
    ProximityError, ProximityState, ResponseReceivedState, SendRequestedDocumentsState,
    TransferEvent, BENIGN_DISCONNECT_MESSAGE,
};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

/// Reduce a transfer event to a terminal acknowledgment, if it is one
pub fn map_callback_state(event: &TransferEvent) -> Option<ResponseReceivedState> {
    match event {
        TransferEvent::ResponseSent => Some(ResponseReceivedState::Success),
        TransferEvent::Error { message } if message == BENIGN_DISCONNECT_MESSAGE => {
            Some(ResponseReceivedState::Success)
        }
        TransferEvent::Error { message } => Some(ResponseReceivedState::Failure(message.clone())),
        TransferEvent::Connected
        | TransferEvent::Connecting
        | TransferEvent::Disconnected
        | TransferEvent::QrEngagementReady { .. }
        | TransferEvent::RequestReceived { .. } => None,
    }
}

/// Combine a submission outcome with an acknowledgment.
///
/// Priority: submission failure, authentication required, acknowledgment
/// failure. A sent request without a successful acknowledgment yields `None`.
pub fn combine(
    submission: &SendRequestedDocumentsState,
    ack: Option<&ResponseReceivedState>,
) -> Option<ProximityState> {
    match (submission, ack) {
        (SendRequestedDocumentsState::Failure(message), _) => {
            Some(ProximityState::Failure(message.clone()))
        }
        (SendRequestedDocumentsState::UserAuthenticationRequired, _) => {
            Some(ProximityState::UserAuthenticationRequired)
        }
        (_, Some(ResponseReceivedState::Failure(message))) => {
            Some(ProximityState::Failure(message.clone()))
        }
        (SendRequestedDocumentsState::RequestSent, Some(ResponseReceivedState::Success)) => {
            Some(ProximityState::Success)
        }
        (SendRequestedDocumentsState::RequestSent, None) => None,
    }
}

/// Terminal acknowledgments carried by a subscription
pub fn mapped_callback_states(
    subscription: EventSubscription<TransferEvent>,
) -> impl Stream<Item = ResponseReceivedState> + Send + 'static {
    subscription
        .into_stream()
        .filter_map(|event| async move { map_callback_state(&event) })
}

/// Drives one submission and waits for its matching acknowledgment
///
/// The acknowledgment window of an attempt opens before the response is built,
/// so only events emitted during that attempt can complete it. Stale
/// acknowledgments of an earlier attempt are never paired with a new one.
pub struct ObservationPipeline {
    orchestrator: Arc<RequestOrchestrator>,
    adapter: Arc<TransferEventAdapter>,
    phase: PhaseTracker,
    ack_timeout: Option<Duration>,
}

impl ObservationPipeline {
    pub fn new(
        orchestrator: Arc<RequestOrchestrator>,
        adapter: Arc<TransferEventAdapter>,
        phase: PhaseTracker,
        ack_timeout: Option<Duration>,
    ) -> Self {
        Self {
            orchestrator,
            adapter,
            phase,
            ack_timeout,
        }
    }

    /// Submit the current disclosures and resolve the combined outcome.
    ///
    /// `None` when nothing was submitted or the session ended before the
    /// verifier acknowledged.
    pub async fn observe_sent_documents_request(&self) -> Option<ProximityState> {
        let mut acks = self.adapter.watch_acknowledgments();
        let submission = self.orchestrator.submit().await?;

        let span = info_span!("observe", attempt = %submission.attempt);
        async move {
            let outcome = match combine(&submission.state, None) {
                Some(outcome) => outcome,
                None => self.await_acknowledgment(&submission, &mut acks).await?,
            };

            self.phase.advance(|phase| phase.on_outcome(&outcome));
            info!(outcome = ?outcome, "Presentation outcome resolved");
            Some(outcome)
        }
        .instrument(span)
        .await
    }

    async fn await_acknowledgment(
        &self,
        submission: &Submission,
        acks: &mut AcknowledgmentWatch,
    ) -> Option<ProximityState> {
        let wait = async {
            while let Some(ack) = acks.recv().await {
                debug!(ack = ?ack, "Acknowledgment observed");
                if let Some(outcome) = combine(&submission.state, Some(&ack)) {
                    return Some(outcome);
                }
            }
            debug!("Event stream ended before acknowledgment");
            None
        };

        let Some(limit) = self.ack_timeout else {
            return wait.await;
        };

        match tokio::time::timeout(limit, wait).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let error = ProximityError::Timeout("verifier acknowledgment".to_string());
                error.log_with_context(&self.orchestrator.error_context_for(submission.attempt));
                Some(ProximityState::Failure(
                    self.orchestrator.generic_error_message(),
                ))
            }
        }
    }
}
