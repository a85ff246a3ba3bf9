use serde::{Deserialize, Serialize};

/// Error text some verifiers emit on normal completion instead of a clean
/// session termination.
pub const BENIGN_DISCONNECT_MESSAGE: &str =
    "Peer disconnected without proper session termination";

/// Identifier of one submission attempt within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// A single data element requested by (or disclosed to) the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocItem {
    pub namespace: String,
    pub element_identifier: String,
    pub intent_to_retain: bool,
}

/// Reader authentication metadata attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderAuth {
    pub reader_common_name: String,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedDocument {
    pub document_id: String,
    pub doc_type: String,
    pub requested_items: Vec<DocItem>,
    pub reader_auth: Option<ReaderAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedDocument {
    pub document_id: String,
    pub doc_type: String,
    pub disclosed_items: Vec<DocItem>,
}

/// Holder-approved subset of the requested documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedDocuments(pub Vec<DisclosedDocument>);

impl DisclosedDocuments {
    pub fn new(documents: Vec<DisclosedDocument>) -> Self {
        Self(documents)
    }

    pub fn documents(&self) -> &[DisclosedDocument] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Typed event delivered by the transfer event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    Connected,
    Connecting,
    Disconnected,
    Error {
        message: String,
    },
    QrEngagementReady {
        qr_payload: String,
    },
    RequestReceived {
        documents: Vec<RequestedDocument>,
        verifier_name: Option<String>,
    },
    ResponseSent,
}

impl TransferEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransferEvent::Connected => "connected",
            TransferEvent::Connecting => "connecting",
            TransferEvent::Disconnected => "disconnected",
            TransferEvent::Error { .. } => "error",
            TransferEvent::QrEngagementReady { .. } => "qr_engagement_ready",
            TransferEvent::RequestReceived { .. } => "request_received",
            TransferEvent::ResponseSent => "response_sent",
        }
    }
}

/// Outcome of one `send_requested_documents` attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendRequestedDocumentsState {
    Failure(String),
    UserAuthenticationRequired,
    RequestSent,
}

/// Verifier acknowledgment derived from the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseReceivedState {
    Success,
    Failure(String),
}

/// Single externally observed presentation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityState {
    UserAuthenticationRequired,
    Failure(String),
    Success,
}

/// Result of asking the engine to build a device response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    Response(Vec<u8>),
    UserAuthRequired,
    Failure(String),
}

/// Request as processed by the engine before it reaches the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedRequest {
    Success(Vec<RequestedDocument>),
    Failure(String),
}

/// Raw callback payloads delivered to a `TransferEventListener`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    QrEngagementReady(String),
    Connecting,
    Connected,
    Disconnected,
    Error(String),
    RequestReceived(ProcessedRequest),
    ResponseSent,
}

/// Opaque handle of the UI host an NFC engagement service binds to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostContext(pub String);

impl HostContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}
