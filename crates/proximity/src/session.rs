// Session lifecycle - owns the cancelable execution context of one presentation

use crate::pipeline::map_callback_state;
use crate::{ProximityState, ResponseReceivedState, SendRequestedDocumentsState, TransferEvent};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Cancelable execution context scoped to one presentation session
///
/// Tasks spawned on the scope fail independently of each other; cancelling the
/// scope ends all of them and runs the registered teardown hooks exactly once.
#[derive(Clone)]
pub struct SessionScope {
    token: CancellationToken,
    hooks: Arc<Mutex<Option<Vec<CancelHook>>>>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            hooks: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a hook to run synchronously on cancellation. Runs immediately
    /// if the scope is already cancelled.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut hooks = self.hooks.lock().unwrap_or_else(|p| p.into_inner());
        match hooks.as_mut() {
            Some(pending) => pending.push(Box::new(hook)),
            None => {
                drop(hooks);
                hook();
            }
        }
    }

    /// Cancel the scope. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        let Some(hooks) = hooks else {
            return false;
        };

        debug!(hooks = hooks.len(), "Cancelling session scope");
        self.token.cancel();
        for hook in hooks {
            hook();
        }
        true
    }

    /// Spawn a task that is dropped when the scope is cancelled.
    /// Resolves to `None` if cancellation won.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => None,
                output = future => Some(output),
            }
        })
    }
}

impl Default for SessionScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse position of a session in the presentation flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Engaging,
    Connecting,
    Connected,
    RequestReceived,
    Submitting,
    AwaitingAuthentication,
    AwaitingAck,
    Succeeded,
    Failed,
    Terminated,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Succeeded | SessionPhase::Failed | SessionPhase::Terminated
        )
    }

    /// Transition on an event from the transfer stream
    pub fn on_event(self, event: &TransferEvent) -> SessionPhase {
        if self.is_terminal() {
            return self;
        }

        match event {
            TransferEvent::QrEngagementReady { .. } => SessionPhase::Engaging,
            TransferEvent::Connecting => SessionPhase::Connecting,
            TransferEvent::Connected => SessionPhase::Connected,
            TransferEvent::RequestReceived { .. } => SessionPhase::RequestReceived,
            TransferEvent::Disconnected => SessionPhase::Failed,
            TransferEvent::ResponseSent | TransferEvent::Error { .. } => {
                match map_callback_state(event) {
                    Some(ResponseReceivedState::Success) => SessionPhase::Succeeded,
                    _ => SessionPhase::Failed,
                }
            }
        }
    }

    /// A new attempt may leave `Failed`; only success and teardown are final
    pub fn on_submission_started(self) -> SessionPhase {
        match self {
            SessionPhase::Succeeded | SessionPhase::Terminated => self,
            _ => SessionPhase::Submitting,
        }
    }

    pub fn on_submission(self, state: &SendRequestedDocumentsState) -> SessionPhase {
        if matches!(self, SessionPhase::Succeeded | SessionPhase::Terminated) {
            return self;
        }

        match state {
            SendRequestedDocumentsState::RequestSent => SessionPhase::AwaitingAck,
            SendRequestedDocumentsState::UserAuthenticationRequired => {
                SessionPhase::AwaitingAuthentication
            }
            SendRequestedDocumentsState::Failure(_) => SessionPhase::Failed,
        }
    }

    /// The resolved outcome overrides whatever intermediate events implied
    pub fn on_outcome(self, state: &ProximityState) -> SessionPhase {
        if self == SessionPhase::Terminated {
            return self;
        }

        match state {
            ProximityState::Success => SessionPhase::Succeeded,
            ProximityState::Failure(_) => SessionPhase::Failed,
            ProximityState::UserAuthenticationRequired => SessionPhase::AwaitingAuthentication,
        }
    }
}

/// Shared, synchronously readable session phase
#[derive(Clone)]
pub struct PhaseTracker {
    phase: Arc<RwLock<SessionPhase>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(RwLock::new(SessionPhase::Idle)),
        }
    }

    pub fn get(&self) -> SessionPhase {
        *self.phase.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Apply a transition and return the resulting phase
    pub fn advance<F>(&self, transition: F) -> SessionPhase
    where
        F: FnOnce(SessionPhase) -> SessionPhase,
    {
        let mut phase = self.phase.write().unwrap_or_else(|p| p.into_inner());
        let current = *phase;
        let next = transition(current);
        if next != current {
            debug!(from = ?current, to = ?next, "Session phase changed");
        }
        *phase = next;
        next
    }

    /// Mark the session as terminated
    pub fn terminate(&self) {
        self.advance(|_| SessionPhase::Terminated);
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
