// Event broadcaster with last-value replay
// Multicasts values to any number of subscribers; a late subscriber first sees
// the most recent value, then everything published after it.

use futures::stream::{self, Stream};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::warn;

/// A published value tagged with its position in the broadcast order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub value: T,
}

struct State<T> {
    tx: Option<broadcast::Sender<Sequenced<T>>>,
    last: Option<Sequenced<T>>,
    next_seq: u64,
}

pub struct EventBroadcaster<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for EventBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> EventBroadcaster<T> {
    /// Create a broadcaster buffering up to `capacity` live values per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(Mutex::new(State {
                tx: Some(tx),
                last: None,
                next_seq: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a value to all subscribers. Returns its sequence number, or
    /// `None` once the broadcaster is closed.
    pub fn publish(&self, value: T) -> Option<u64> {
        let mut state = self.lock();
        let tx = state.tx.clone()?;

        state.next_seq += 1;
        let item = Sequenced {
            seq: state.next_seq,
            value,
        };
        // No receivers is fine, the value is still kept for replay
        let _ = tx.send(item.clone());
        state.last = Some(item);
        Some(state.next_seq)
    }

    /// Subscribe, replaying the most recent value first
    pub fn subscribe(&self) -> EventSubscription<T> {
        let state = self.lock();
        match state.tx.as_ref() {
            Some(tx) => EventSubscription {
                replay: state.last.clone(),
                rx: Some(tx.subscribe()),
            },
            None => EventSubscription::ended(),
        }
    }

    /// Subscribe to values published strictly after this call
    pub fn subscribe_fresh(&self) -> EventSubscription<T> {
        let state = self.lock();
        match state.tx.as_ref() {
            Some(tx) => EventSubscription {
                replay: None,
                rx: Some(tx.subscribe()),
            },
            None => EventSubscription::ended(),
        }
    }

    /// Most recently published value
    pub fn last(&self) -> Option<Sequenced<T>> {
        self.lock().last.clone()
    }

    /// End every subscription once its buffered values are drained
    pub fn close(&self) {
        self.lock().tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().tx.is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .tx
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// One consumer's view of an `EventBroadcaster`
pub struct EventSubscription<T> {
    replay: Option<Sequenced<T>>,
    rx: Option<broadcast::Receiver<Sequenced<T>>>,
}

impl<T: Clone + Send + 'static> EventSubscription<T> {
    fn ended() -> Self {
        Self {
            replay: None,
            rx: None,
        }
    }

    /// Wait for the next value. `None` means the broadcaster was closed.
    pub async fn recv(&mut self) -> Option<Sequenced<T>> {
        if let Some(item) = self.replay.take() {
            return Some(item);
        }

        let outcome = {
            let rx = self.rx.as_mut()?;
            loop {
                match rx.recv().await {
                    Ok(item) => break Some(item),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged behind, skipping ahead");
                    }
                    Err(RecvError::Closed) => break None,
                }
            }
        };

        if outcome.is_none() {
            self.rx = None;
        }
        outcome
    }

    /// Take the next value if one is already available
    pub fn try_recv(&mut self) -> Option<Sequenced<T>> {
        if let Some(item) = self.replay.take() {
            return Some(item);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged behind, skipping ahead");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a stream of values, ending when the broadcaster closes
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|item| (item.value, subscription))
        })
    }
}
