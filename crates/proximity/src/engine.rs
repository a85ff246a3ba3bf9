// Engine abstraction layer for proximity presentations
// The secure channel, mdoc encoding and radio handling live behind these traits

use crate::{DisclosedDocuments, EngineNotification, HostContext, ResponseResult, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Callback sink registered with the engine
pub trait TransferEventListener: Send + Sync {
    /// Receive one raw notification from the engine
    fn on_transfer_event(&self, notification: EngineNotification);
}

/// Proximity engine driving engagement, response building and transmission
#[async_trait]
pub trait ProximityEngine: Send + Sync {
    /// Register a callback sink
    fn add_transfer_event_listener(&self, listener: Arc<dyn TransferEventListener>);

    /// Unregister a previously added callback sink
    fn remove_transfer_event_listener(&self, listener: &Arc<dyn TransferEventListener>);

    /// Hard stop of any in-progress session. Must be idempotent.
    fn stop_presentation(&self) -> Result<()>;

    /// Begin QR-based device engagement; progress is reported to listeners
    async fn start_qr_engagement(&self) -> Result<()>;

    /// Build a device response from the approved disclosures
    async fn create_response(&self, disclosed: &DisclosedDocuments) -> Result<ResponseResult>;

    /// Transmit a built response over the established channel
    async fn send_response(&self, response: Vec<u8>) -> Result<()>;
}

/// NFC listening service bound to a UI host
pub trait NfcEngagementService: Send + Sync {
    fn enable(&self, host: &HostContext) -> Result<()>;

    fn disable(&self, host: &HostContext) -> Result<()>;
}

/// Localized strings shown to the holder
pub trait ResourceProvider: Send + Sync {
    fn generic_error_message(&self) -> String;
}

/// Resource provider returning a fixed message
#[derive(Debug, Clone)]
pub struct StaticResourceProvider {
    generic_error_message: String,
}

impl StaticResourceProvider {
    pub fn new(generic_error_message: impl Into<String>) -> Self {
        Self {
            generic_error_message: generic_error_message.into(),
        }
    }
}

impl Default for StaticResourceProvider {
    fn default() -> Self {
        Self::new("Something went wrong. Please try again.")
    }
}

impl ResourceProvider for StaticResourceProvider {
    fn generic_error_message(&self) -> String {
        self.generic_error_message.clone()
    }
}
