pub mod types;
pub mod error;
pub mod engine;
pub mod broadcaster;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod session;
pub mod controller;

pub use types::*;
pub use error::{ProximityError, Result, ErrorContext, ErrorCategory};
pub use engine::{
    NfcEngagementService, ProximityEngine, ResourceProvider, StaticResourceProvider,
    TransferEventListener,
};
pub use broadcaster::{EventBroadcaster, EventSubscription, Sequenced};
pub use events::{AcknowledgmentWatch, TransferEventAdapter, MIN_EVENT_CHANNEL_CAPACITY};
pub use orchestrator::{RequestOrchestrator, Submission};
pub use pipeline::{combine, map_callback_state, ObservationPipeline};
pub use session::{PhaseTracker, SessionPhase, SessionScope};
pub use controller::PresentationController;
pub use shared::config::PresentationConfig;
