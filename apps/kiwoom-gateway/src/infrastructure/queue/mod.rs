//! Event Queue
//!
//! The single ordered delivery path between the broker callback surface
//! and the event router. FIFO, unbounded, with a monitored depth for
//! backpressure signaling; the producer side is the broker's callback
//! thread and must never block.
//!
//! Events sharing a screen are never reordered (single FIFO); cross-screen
//! ordering is unspecified and must not be relied upon.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::domain::events::InboundEvent;

// =============================================================================
// Errors
// =============================================================================

/// Delivery failure: the consumer side is gone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event queue closed")]
pub struct QueueClosed;

// =============================================================================
// Channel Construction
// =============================================================================

/// Create a connected sink/stream pair.
#[must_use]
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        EventSink {
            tx,
            depth: Arc::clone(&depth),
        },
        EventStream { rx, depth },
    )
}

// =============================================================================
// Sink
// =============================================================================

/// Producer handle handed to the broker bridge.
///
/// Cloneable; all clones feed the same FIFO. Delivery is non-blocking.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<InboundEvent>,
    depth: Arc<AtomicUsize>,
}

impl EventSink {
    /// Enqueue one event.
    pub fn deliver(&self, event: InboundEvent) -> Result<(), QueueClosed> {
        self.tx.send(event).map_err(|_| QueueClosed)?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Events currently queued and not yet consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Stream
// =============================================================================

/// Consumer half, owned by the single event-router task.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    depth: Arc<AtomicUsize>,
}

impl EventStream {
    /// Dequeue the next event, or `None` when every sink is dropped.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        event
    }

    /// Events currently queued and not yet consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::domain::events::RawCode;
    use tokio_test::assert_ok;

    use super::*;

    fn connect_event(code: i32) -> InboundEvent {
        InboundEvent::ConnectState {
            code: RawCode(code),
        }
    }

    #[tokio::test]
    async fn delivery_preserves_fifo_order() {
        let (sink, mut stream) = event_channel();
        tokio_test::assert_ok!(sink.deliver(connect_event(0)));
        tokio_test::assert_ok!(sink.deliver(connect_event(-100)));

        assert!(matches!(
            stream.recv().await,
            Some(InboundEvent::ConnectState { code: RawCode(0) })
        ));
        assert!(matches!(
            stream.recv().await,
            Some(InboundEvent::ConnectState { code: RawCode(-100) })
        ));
    }

    #[tokio::test]
    async fn depth_tracks_queued_events() {
        let (sink, mut stream) = event_channel();
        assert_eq!(sink.depth(), 0);

        sink.deliver(connect_event(0)).unwrap();
        sink.deliver(connect_event(0)).unwrap();
        assert_eq!(sink.depth(), 2);
        assert_eq!(stream.depth(), 2);

        let _ = stream.recv().await;
        assert_eq!(stream.depth(), 1);
    }

    #[tokio::test]
    async fn delivery_after_consumer_drop_reports_closed() {
        let (sink, stream) = event_channel();
        drop(stream);
        assert_eq!(sink.deliver(connect_event(0)).unwrap_err(), QueueClosed);
    }

    #[tokio::test]
    async fn stream_ends_when_all_sinks_drop() {
        let (sink, mut stream) = event_channel();
        let clone = sink.clone();
        drop(sink);
        clone.deliver(connect_event(0)).unwrap();
        drop(clone);

        assert!(stream.recv().await.is_some());
        assert!(stream.recv().await.is_none());
    }
}
