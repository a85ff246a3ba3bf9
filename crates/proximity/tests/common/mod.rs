// Test doubles for the engine-side collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use proximity::{
    DisclosedDocument, DisclosedDocuments, DocItem, EngineNotification, HostContext,
    NfcEngagementService, PresentationConfig, PresentationController, ProcessedRequest,
    ProximityEngine, ProximityError, ReaderAuth, RequestedDocument, ResponseResult, Result,
    StaticResourceProvider, TransferEventListener,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GENERIC_ERROR: &str = "Generic error";

/// Scriptable in-memory proximity engine
pub struct MockEngine {
    listeners: Mutex<Vec<Arc<dyn TransferEventListener>>>,
    pub add_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    response: Mutex<Result<ResponseResult>>,
    send_result: Mutex<Result<()>>,
    start_result: Mutex<Result<()>>,
    stop_result: Mutex<Result<()>>,
    create_delay: Mutex<Option<Duration>>,
    /// Notifications emitted while `send_response` runs
    on_send: Mutex<Vec<EngineNotification>>,
    /// Notifications emitted while `start_qr_engagement` runs
    on_start: Mutex<Vec<EngineNotification>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            add_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(ResponseResult::Response(vec![0xA2, 0x01, 0x02]))),
            send_result: Mutex::new(Ok(())),
            start_result: Mutex::new(Ok(())),
            stop_result: Mutex::new(Ok(())),
            create_delay: Mutex::new(None),
            on_send: Mutex::new(Vec::new()),
            on_start: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_response(&self, response: Result<ResponseResult>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn set_send_result(&self, result: Result<()>) {
        *self.send_result.lock().unwrap() = result;
    }

    pub fn set_start_result(&self, result: Result<()>) {
        *self.start_result.lock().unwrap() = result;
    }

    pub fn set_stop_result(&self, result: Result<()>) {
        *self.stop_result.lock().unwrap() = result;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn emit_on_send(&self, notifications: Vec<EngineNotification>) {
        *self.on_send.lock().unwrap() = notifications;
    }

    pub fn emit_on_start(&self, notifications: Vec<EngineNotification>) {
        *self.on_start.lock().unwrap() = notifications;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Deliver a notification to every registered listener
    pub fn emit(&self, notification: EngineNotification) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_transfer_event(notification.clone());
        }
    }

    fn emit_all(&self, notifications: Vec<EngineNotification>) {
        for notification in notifications {
            self.emit(notification);
        }
    }
}

#[async_trait]
impl ProximityEngine for MockEngine {
    fn add_transfer_event_listener(&self, listener: Arc<dyn TransferEventListener>) {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push(listener);
    }

    fn remove_transfer_event_listener(&self, listener: &Arc<dyn TransferEventListener>) {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .lock()
            .unwrap()
            .retain(|l| Arc::as_ptr(l) as *const () != target);
    }

    fn stop_presentation(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stop_result.lock().unwrap().clone()
    }

    async fn start_qr_engagement(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let notifications = self.on_start.lock().unwrap().clone();
        self.emit_all(notifications);
        self.start_result.lock().unwrap().clone()
    }

    async fn create_response(&self, _disclosed: &DisclosedDocuments) -> Result<ResponseResult> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }

    async fn send_response(&self, response: Vec<u8>) -> Result<()> {
        let result = self.send_result.lock().unwrap().clone();
        if result.is_ok() {
            self.sent.lock().unwrap().push(response);
            let notifications = self.on_send.lock().unwrap().clone();
            self.emit_all(notifications);
        }
        result
    }
}

/// NFC service recording enable/disable calls
#[derive(Default)]
pub struct MockNfc {
    pub calls: Mutex<Vec<(String, bool)>>,
    pub fail: Mutex<bool>,
}

impl NfcEngagementService for MockNfc {
    fn enable(&self, host: &HostContext) -> Result<()> {
        self.calls.lock().unwrap().push((host.id().to_string(), true));
        if *self.fail.lock().unwrap() {
            return Err(ProximityError::NfcEngagement("adapter disabled".to_string()));
        }
        Ok(())
    }

    fn disable(&self, host: &HostContext) -> Result<()> {
        self.calls.lock().unwrap().push((host.id().to_string(), false));
        Ok(())
    }
}

pub fn controller_with(
    engine: &Arc<MockEngine>,
    config: PresentationConfig,
) -> (PresentationController, Arc<MockNfc>) {
    let nfc = Arc::new(MockNfc::default());
    let controller = PresentationController::new(
        Arc::clone(engine) as Arc<dyn ProximityEngine>,
        Arc::clone(&nfc) as Arc<dyn NfcEngagementService>,
        Arc::new(StaticResourceProvider::new(GENERIC_ERROR)),
        &config,
    );
    (controller, nfc)
}

pub fn controller(engine: &Arc<MockEngine>) -> PresentationController {
    controller_with(engine, PresentationConfig::default()).0
}

pub fn item(element: &str) -> DocItem {
    DocItem {
        namespace: "eu.europa.ec.eudi.pid.1".to_string(),
        element_identifier: element.to_string(),
        intent_to_retain: false,
    }
}

pub fn requested(id: &str, reader: Option<&str>) -> RequestedDocument {
    RequestedDocument {
        document_id: id.to_string(),
        doc_type: "eu.europa.ec.eudi.pid.1".to_string(),
        requested_items: vec![item("family_name"), item("birth_date")],
        reader_auth: reader.map(|name| ReaderAuth {
            reader_common_name: name.to_string(),
            is_verified: true,
        }),
    }
}

pub fn request_received(documents: Vec<RequestedDocument>) -> EngineNotification {
    EngineNotification::RequestReceived(ProcessedRequest::Success(documents))
}

pub fn disclosed(id: &str) -> DisclosedDocuments {
    DisclosedDocuments::new(vec![DisclosedDocument {
        document_id: id.to_string(),
        doc_type: "eu.europa.ec.eudi.pid.1".to_string(),
        disclosed_items: vec![item("family_name")],
    }])
}
