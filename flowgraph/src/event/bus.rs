//! Event bus: best-effort fan-out of run lifecycle events.
//!
//! Each subscription owns a bounded queue; `publish` uses `try_send` and
//! counts overflow drops instead of applying backpressure to the scheduler.
//! A failing or slow listener can therefore lose events, never stall a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::RunEvent;

/// Default per-subscription queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct ListenerSlot {
    tx: mpsc::Sender<RunEvent>,
    dropped: Arc<AtomicU64>,
}

/// Fan-out bus for [`RunEvent`]s.
///
/// **Interaction**: the scheduler publishes; callers subscribe before (or
/// during) a run. Publish is synchronous and never blocks or fails; closed
/// subscriptions are pruned lazily on the next publish.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<ListenerSlot>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener with the default queue capacity.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Registers a listener with an explicit bounded queue capacity.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        self.listeners
            .lock()
            .expect("event bus lock poisoned")
            .push(ListenerSlot {
                tx,
                dropped: dropped.clone(),
            });
        Subscription { rx, dropped }
    }

    /// Delivers `event` to every live subscription.
    ///
    /// A full queue drops the event for that listener and bumps its drop
    /// counter; a closed (dropped) subscription is removed.
    pub fn publish(&self, event: &RunEvent) {
        let mut listeners = self.listeners.lock().expect("event bus lock poisoned");
        listeners.retain(|slot| match slot.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                slot.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of currently registered listeners (closed ones may linger
    /// until the next publish).
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("event bus lock poisoned").len()
    }
}

/// Receiving side of one event-bus registration.
pub struct Subscription {
    rx: mpsc::Receiver<RunEvent>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Next event, or `None` once the bus side is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        self.rx.try_recv().ok()
    }

    /// Events dropped for this listener because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Consumes the subscription as a `Stream` of events.
    pub fn into_stream(self) -> ReceiverStream<RunEvent> {
        ReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_started(id: &str) -> RunEvent {
        RunEvent::NodeStarted {
            node_id: id.to_string(),
        }
    }

    /// **Scenario**: Every subscription receives every published event.
    #[tokio::test]
    async fn publish_fans_out_to_all_listeners() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(&node_started("n1"));
        for sub in [&mut a, &mut b] {
            match sub.recv().await {
                Some(RunEvent::NodeStarted { node_id }) => assert_eq!(node_id, "n1"),
                other => panic!("expected NodeStarted, got {:?}", other),
            }
        }
    }

    /// **Scenario**: A full listener queue drops events and counts them;
    /// publish itself never blocks or fails.
    #[tokio::test]
    async fn overflow_drops_and_counts() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_with_capacity(2);
        for i in 0..5 {
            bus.publish(&node_started(&format!("n{i}")));
        }
        assert_eq!(sub.dropped(), 3);
        // The two oldest delivered events survive.
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    /// **Scenario**: Dropping a subscription does not break publishing to
    /// the others; the dead listener is pruned.
    #[tokio::test]
    async fn closed_subscription_is_pruned() {
        let bus = EventBus::new();
        let dead = bus.subscribe();
        let mut live = bus.subscribe();
        drop(dead);
        bus.publish(&node_started("n1"));
        assert_eq!(bus.listener_count(), 1);
        assert!(matches!(
            live.recv().await,
            Some(RunEvent::NodeStarted { .. })
        ));
    }

    /// **Scenario**: into_stream yields published events in order.
    #[tokio::test]
    async fn subscription_as_stream() {
        use tokio_stream::StreamExt;

        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.publish(&node_started("n1"));
        bus.publish(&node_started("n2"));
        drop(bus);
        let ids: Vec<_> = sub
            .into_stream()
            .map(|e| e.node_id().unwrap_or_default().to_string())
            .collect()
            .await;
        assert_eq!(ids, vec!["n1".to_string(), "n2".to_string()]);
    }
}
