// Transfer event stream - turns engine callbacks into one shared, ordered event stream

use crate::broadcaster::{EventBroadcaster, EventSubscription};
use crate::engine::{ProximityEngine, TransferEventListener};
use crate::pipeline::map_callback_state;
use crate::session::{PhaseTracker, SessionScope};
use crate::{
    EngineNotification, ProcessedRequest, ProximityError, RequestedDocument,
    ResponseReceivedState, Result, TransferEvent,
};
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Smallest event buffer a session runs with; smaller configured values are raised
pub const MIN_EVENT_CHANNEL_CAPACITY: usize = 16;

type AckWatchers = Arc<Mutex<Vec<mpsc::UnboundedSender<ResponseReceivedState>>>>;

/// Map a raw engine notification to a typed transfer event
pub fn map_notification(notification: EngineNotification) -> Result<TransferEvent> {
    let event = match notification {
        EngineNotification::QrEngagementReady(qr_payload) => {
            TransferEvent::QrEngagementReady { qr_payload }
        }
        EngineNotification::Connecting => TransferEvent::Connecting,
        EngineNotification::Connected => TransferEvent::Connected,
        EngineNotification::Disconnected => TransferEvent::Disconnected,
        EngineNotification::Error(message) => TransferEvent::Error { message },
        EngineNotification::RequestReceived(ProcessedRequest::Success(documents)) => {
            let verifier_name = verifier_name_of(&documents);
            TransferEvent::RequestReceived {
                documents,
                verifier_name,
            }
        }
        EngineNotification::RequestReceived(ProcessedRequest::Failure(message)) => {
            return Err(ProximityError::RequestProcessing(message));
        }
        EngineNotification::ResponseSent => TransferEvent::ResponseSent,
    };
    Ok(event)
}

/// Reader common name of the first requested document, if authenticated
pub fn verifier_name_of(documents: &[RequestedDocument]) -> Option<String> {
    documents
        .first()?
        .reader_auth
        .as_ref()
        .map(|auth| auth.reader_common_name.clone())
}

/// Listener registered with the engine; publishes into the shared broadcaster
struct EventSink {
    broadcaster: EventBroadcaster<TransferEvent>,
    verifier_name: Arc<RwLock<Option<String>>>,
    phase: PhaseTracker,
    ack_watchers: AckWatchers,
}

impl EventSink {
    fn forward_acknowledgment(&self, event: &TransferEvent) {
        let Some(ack) = map_callback_state(event) else {
            return;
        };
        let mut watchers = self.ack_watchers.lock().unwrap_or_else(|p| p.into_inner());
        watchers.retain(|watcher| watcher.send(ack.clone()).is_ok());
    }
}

impl TransferEventListener for EventSink {
    fn on_transfer_event(&self, notification: EngineNotification) {
        let event = map_notification(notification).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to map engine notification, reporting as error event");
            TransferEvent::Error {
                message: err.detail().map(str::to_string).unwrap_or_else(|| err.to_string()),
            }
        });

        if let TransferEvent::RequestReceived {
            verifier_name: Some(name),
            ..
        } = &event
        {
            *self.verifier_name.write().unwrap_or_else(|p| p.into_inner()) = Some(name.clone());
        }

        self.phase.advance(|phase| phase.on_event(&event));
        debug!(event = event.name(), "Transfer event received");
        self.forward_acknowledgment(&event);
        self.broadcaster.publish(event);
    }
}

/// Shared transfer event stream of one presentation session
///
/// Only one listener is ever attached to the engine, on first subscription,
/// no matter how many consumers subscribe. Cancelling the session scope
/// removes the listener, issues a defensive stop and ends all subscriptions.
pub struct TransferEventAdapter {
    engine: Arc<dyn ProximityEngine>,
    broadcaster: EventBroadcaster<TransferEvent>,
    listener: Arc<dyn TransferEventListener>,
    registered: AtomicBool,
    verifier_name: Arc<RwLock<Option<String>>>,
    ack_watchers: AckWatchers,
    scope: SessionScope,
}

impl TransferEventAdapter {
    pub fn new(
        engine: Arc<dyn ProximityEngine>,
        scope: SessionScope,
        phase: PhaseTracker,
        capacity: usize,
    ) -> Self {
        let broadcaster = EventBroadcaster::new(capacity.max(MIN_EVENT_CHANNEL_CAPACITY));
        let verifier_name = Arc::new(RwLock::new(None));
        let ack_watchers: AckWatchers = Arc::new(Mutex::new(Vec::new()));
        let listener: Arc<dyn TransferEventListener> = Arc::new(EventSink {
            broadcaster: broadcaster.clone(),
            verifier_name: Arc::clone(&verifier_name),
            phase,
            ack_watchers: Arc::clone(&ack_watchers),
        });

        let closing = broadcaster.clone();
        let watchers = Arc::clone(&ack_watchers);
        scope.on_cancel(move || {
            closing.close();
            watchers.lock().unwrap_or_else(|p| p.into_inner()).clear();
        });

        Self {
            engine,
            broadcaster,
            listener,
            registered: AtomicBool::new(false),
            verifier_name,
            ack_watchers,
            scope,
        }
    }

    /// Attach the listener to the engine if not done yet
    pub fn ensure_registered(&self) {
        if self.scope.is_cancelled() || self.registered.swap(true, Ordering::SeqCst) {
            return;
        }

        self.engine
            .add_transfer_event_listener(Arc::clone(&self.listener));
        info!("Transfer event listener registered");

        let engine = Arc::clone(&self.engine);
        let listener = Arc::clone(&self.listener);
        self.scope.on_cancel(move || {
            engine.remove_transfer_event_listener(&listener);
            if let Err(e) = engine.stop_presentation() {
                warn!(error = %e, "Engine stop failed during teardown, ignoring");
            }
            info!("Transfer event listener removed");
        });
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Subscribe, replaying the latest event first
    pub fn subscribe(&self) -> EventSubscription<TransferEvent> {
        self.ensure_registered();
        self.broadcaster.subscribe()
    }

    /// Watch terminal acknowledgments emitted strictly after this call.
    ///
    /// Unlike a subscription, the watch is unbounded and never skips an
    /// acknowledgment however many events arrive before it is polled.
    pub fn watch_acknowledgments(&self) -> AcknowledgmentWatch {
        self.ensure_registered();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = self.ack_watchers.lock().unwrap_or_else(|p| p.into_inner());
        // Teardown clears the list after cancelling, so a late sender would leak
        if !self.scope.is_cancelled() {
            watchers.push(tx);
        }
        AcknowledgmentWatch { rx }
    }

    /// Shared event stream; ends when the session is torn down
    pub fn events(&self) -> impl Stream<Item = TransferEvent> + Send + 'static {
        self.subscribe().into_stream()
    }

    /// Report a failure that happened outside the engine callbacks as an
    /// error event on the shared stream
    pub fn report_error(&self, message: impl Into<String>) {
        self.listener
            .on_transfer_event(EngineNotification::Error(message.into()));
    }

    pub fn last_event(&self) -> Option<TransferEvent> {
        self.broadcaster.last().map(|item| item.value)
    }

    /// Verifier name cached from the latest authenticated request
    pub fn verifier_name(&self) -> Option<String> {
        self.verifier_name
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Lossless feed of terminal acknowledgments; ends with the session
pub struct AcknowledgmentWatch {
    rx: mpsc::UnboundedReceiver<ResponseReceivedState>,
}

impl AcknowledgmentWatch {
    pub async fn recv(&mut self) -> Option<ResponseReceivedState> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocItem, ReaderAuth};

    fn document(id: &str, reader: Option<&str>) -> RequestedDocument {
        RequestedDocument {
            document_id: id.to_string(),
            doc_type: "eu.europa.ec.eudi.pid.1".to_string(),
            requested_items: vec![DocItem {
                namespace: "eu.europa.ec.eudi.pid.1".to_string(),
                element_identifier: "family_name".to_string(),
                intent_to_retain: false,
            }],
            reader_auth: reader.map(|name| ReaderAuth {
                reader_common_name: name.to_string(),
                is_verified: true,
            }),
        }
    }

    #[test]
    fn test_map_simple_notifications() {
        assert_eq!(
            map_notification(EngineNotification::Connecting).unwrap(),
            TransferEvent::Connecting
        );
        assert_eq!(
            map_notification(EngineNotification::QrEngagementReady("mdoc:xyz".into())).unwrap(),
            TransferEvent::QrEngagementReady {
                qr_payload: "mdoc:xyz".to_string()
            }
        );
        assert_eq!(
            map_notification(EngineNotification::Error("radio off".into())).unwrap(),
            TransferEvent::Error {
                message: "radio off".to_string()
            }
        );
    }

    #[test]
    fn test_map_failed_request_is_error() {
        let result = map_notification(EngineNotification::RequestReceived(
            ProcessedRequest::Failure("bad cbor".to_string()),
        ));
        assert_eq!(
            result.unwrap_err(),
            ProximityError::RequestProcessing("bad cbor".to_string())
        );
    }

    struct SilentEngine;

    #[async_trait::async_trait]
    impl ProximityEngine for SilentEngine {
        fn add_transfer_event_listener(&self, _listener: Arc<dyn TransferEventListener>) {}
        fn remove_transfer_event_listener(&self, _listener: &Arc<dyn TransferEventListener>) {}
        fn stop_presentation(&self) -> Result<()> {
            Ok(())
        }
        async fn start_qr_engagement(&self) -> Result<()> {
            Ok(())
        }
        async fn create_response(
            &self,
            _disclosed: &crate::DisclosedDocuments,
        ) -> Result<crate::ResponseResult> {
            Ok(crate::ResponseResult::Response(Vec::new()))
        }
        async fn send_response(&self, _response: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    fn adapter(capacity: usize) -> (TransferEventAdapter, SessionScope) {
        let scope = SessionScope::new();
        let adapter = TransferEventAdapter::new(
            Arc::new(SilentEngine),
            scope.clone(),
            PhaseTracker::new(),
            capacity,
        );
        (adapter, scope)
    }

    #[tokio::test]
    async fn test_acknowledgment_watch_keeps_every_ack_behind_a_flood() {
        let (adapter, _scope) = adapter(1);
        let mut watch = adapter.watch_acknowledgments();

        adapter.listener.on_transfer_event(EngineNotification::ResponseSent);
        for _ in 0..(MIN_EVENT_CHANNEL_CAPACITY * 4) {
            adapter.listener.on_transfer_event(EngineNotification::Connected);
        }
        adapter
            .listener
            .on_transfer_event(EngineNotification::Error("verifier rejected".into()));

        assert_eq!(watch.recv().await, Some(ResponseReceivedState::Success));
        assert_eq!(
            watch.recv().await,
            Some(ResponseReceivedState::Failure("verifier rejected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_acknowledgment_watch_ends_with_session() {
        let (adapter, scope) = adapter(8);
        let mut open = adapter.watch_acknowledgments();

        scope.cancel();
        assert_eq!(open.recv().await, None);

        let mut late = adapter.watch_acknowledgments();
        assert_eq!(late.recv().await, None);
    }

    #[test]
    fn test_verifier_name_from_first_document_only() {
        let documents = vec![document("a", None), document("b", Some("Other"))];
        assert_eq!(verifier_name_of(&documents), None);

        let documents = vec![document("a", Some("ACME Corp")), document("b", None)];
        assert_eq!(verifier_name_of(&documents), Some("ACME Corp".to_string()));

        assert_eq!(verifier_name_of(&[]), None);
    }
}
