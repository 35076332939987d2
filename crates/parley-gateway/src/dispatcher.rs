use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use parley_types::events::GatewayEvent;
use parley_types::models::SessionStatus;

/// Buffered events per subscriber before the slowest one starts losing them.
const EVENT_BUFFER: usize = 1024;

/// Fans events out to every connected dashboard and remembers the bridge's
/// last reported session status.
///
/// Delivery is at-most-once: nothing is persisted or replayed, so clients
/// must treat the REST API as the source of truth.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
    session: RwLock<SessionStatus>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                session: RwLock::new(SessionStatus::default()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    /// Returns how many subscribers it was queued for; zero is not an error.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        match self.inner.broadcast_tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("No gateway subscribers, event dropped");
                0
            }
        }
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.inner.session.read().await.clone()
    }

    /// Record the bridge's status and tell every client about it.
    pub async fn set_session_status(&self, status: SessionStatus) {
        *self.inner.session.write().await = status.clone();
        self.broadcast(GatewayEvent::WaStatus(status));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_without_subscribers_is_dropped() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher.broadcast(GatewayEvent::Ready {
            user_id: 1,
            email: "a@b.c".into(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        let event = GatewayEvent::Ready { user_id: 1, email: "a@b.c".into() };
        assert_eq!(dispatcher.broadcast(event.clone()), 2);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn session_status_is_stored_and_broadcast() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.session_status().await, SessionStatus::default());

        let mut rx = dispatcher.subscribe();
        let status = SessionStatus { connected: false, qr: Some("qr".into()) };
        dispatcher.set_session_status(status.clone()).await;

        assert_eq!(dispatcher.session_status().await, status);
        assert_eq!(rx.recv().await.unwrap(), GatewayEvent::WaStatus(status));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let dispatcher = Dispatcher::new();
        dispatcher.broadcast(GatewayEvent::Ready { user_id: 1, email: "x".into() });

        let mut rx = dispatcher.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
