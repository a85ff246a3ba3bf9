use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::types::AttemptId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProximityError {
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Request processing failed: {0}")]
    RequestProcessing(String),

    #[error("Response transmission failed: {0}")]
    Transmission(String),

    #[error("NFC engagement error: {0}")]
    NfcEngagement(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Session terminated")]
    SessionTerminated,

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, ProximityError>;

/// Context for error logging
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub session_id: Option<Uuid>,
    pub attempt_id: Option<AttemptId>,
    pub verifier_name: Option<String>,
    pub additional_info: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_attempt_id(mut self, attempt_id: AttemptId) -> Self {
        self.attempt_id = Some(attempt_id);
        self
    }

    pub fn with_verifier_name(mut self, verifier_name: Option<String>) -> Self {
        self.verifier_name = verifier_name;
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

impl ProximityError {
    /// Log error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        error!(
            error = %self,
            error_type = ?self,
            category = %self.category(),
            session_id = ?context.session_id,
            attempt_id = ?context.attempt_id,
            verifier_name = ?context.verifier_name,
            additional_info = ?context.additional_info,
            timestamp = %chrono::Utc::now(),
            "Proximity presentation error occurred"
        );
    }

    /// Engine-supplied detail, if the variant carries a non-empty one
    pub fn detail(&self) -> Option<&str> {
        let detail = match self {
            ProximityError::EngineFailure(msg)
            | ProximityError::RequestProcessing(msg)
            | ProximityError::Transmission(msg)
            | ProximityError::NfcEngagement(msg)
            | ProximityError::Timeout(msg)
            | ProximityError::InternalError(msg) => msg.as_str(),
            ProximityError::SessionTerminated => return None,
        };
        if detail.trim().is_empty() {
            None
        } else {
            Some(detail)
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProximityError::EngineFailure(details) => {
                format!("The wallet could not prepare your documents: {}.", details)
            }
            ProximityError::RequestProcessing(details) => {
                format!("The verifier's request could not be read: {}.", details)
            }
            ProximityError::Transmission(details) => {
                format!("Sending your documents failed: {}. Please stay close to the verifier and try again.", details)
            }
            ProximityError::NfcEngagement(details) => {
                format!("NFC error: {}. Please check your NFC settings.", details)
            }
            ProximityError::Timeout(operation) => {
                format!("Operation timed out: {}. Please try again.", operation)
            }
            ProximityError::SessionTerminated => {
                "The presentation session has ended. Please start a new one.".to_string()
            }
            ProximityError::InternalError(details) => {
                format!("An internal error occurred: {}. Please try again.", details)
            }
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProximityError::EngineFailure(_) => ErrorCategory::Engine,
            ProximityError::RequestProcessing(_) => ErrorCategory::Request,
            ProximityError::Transmission(_) => ErrorCategory::Transport,
            ProximityError::NfcEngagement(_) => ErrorCategory::Transport,
            ProximityError::Timeout(_) => ErrorCategory::Timeout,
            ProximityError::SessionTerminated => ErrorCategory::Session,
            ProximityError::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Engine,
    Request,
    Transport,
    Timeout,
    Session,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Engine => write!(f, "engine"),
            ErrorCategory::Request => write!(f, "request"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}
