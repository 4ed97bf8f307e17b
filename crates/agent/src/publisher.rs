//! One-way sink from a running cycle to its single client connection.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream_event::StreamEvent;

/// Default number of events buffered between the cycle and the client.
pub const DEFAULT_CAPACITY: usize = 64;

/// How long a full buffer may block the cycle before the client is
/// treated as gone.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes [`StreamEvent`]s to one receiver in emission order.
///
/// Delivery is at most once. When the receiver goes away, or stops reading
/// for longer than the stall timeout, the publisher stops sending and the
/// cycle carries on. `stream_end` goes out exactly
/// once: from [`StreamPublisher::finish`], or from `Drop` if the cycle
/// never got that far.
pub struct StreamPublisher {
    tx: Option<mpsc::Sender<StreamEvent>>,
    ended: bool,
    delivered: usize,
    stall_timeout: Duration,
}

impl StreamPublisher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let publisher = Self {
            tx: Some(tx),
            ended: false,
            delivered: 0,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        };
        (publisher, rx)
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Send one event. Returns `false` once the client is gone.
    pub async fn publish(&mut self, event: StreamEvent) -> bool {
        if self.ended {
            debug!(event = event.event_type(), "Event after stream_end dropped");
            return false;
        }
        if event.is_end() {
            self.ended = true;
        }

        let Some(tx) = &self.tx else {
            return false;
        };
        let sent = tokio::time::timeout(self.stall_timeout, tx.send(event)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                debug!(delivered = self.delivered, "Client disconnected, dropping further events");
                self.tx = None;
                return false;
            }
            Err(_) => {
                warn!(
                    delivered = self.delivered,
                    stall_ms = self.stall_timeout.as_millis() as u64,
                    "Client stopped reading, dropping further events"
                );
                self.tx = None;
                return false;
            }
        }
        self.delivered += 1;
        true
    }

    /// Send `stream_end` and close the stream.
    pub async fn finish(mut self) {
        if !self.ended {
            self.publish(StreamEvent::StreamEnd).await;
        }
        self.tx = None;
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    /// Events handed to the client so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

impl Drop for StreamPublisher {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(StreamEvent::StreamEnd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn finish_sends_one_stream_end() {
        let (mut publisher, rx) = StreamPublisher::channel(8);
        assert!(publisher.publish(StreamEvent::status("go")).await);
        publisher.finish().await;

        let events = drain(rx).await;
        assert_eq!(events, vec![StreamEvent::status("go"), StreamEvent::StreamEnd]);
    }

    #[tokio::test]
    async fn explicit_stream_end_is_not_repeated() {
        let (mut publisher, rx) = StreamPublisher::channel(8);
        publisher.publish(StreamEvent::StreamEnd).await;
        assert!(!publisher.publish(StreamEvent::status("late")).await);
        publisher.finish().await;

        assert_eq!(drain(rx).await, vec![StreamEvent::StreamEnd]);
    }

    #[tokio::test]
    async fn drop_without_finish_still_ends_the_stream() {
        let (mut publisher, rx) = StreamPublisher::channel(8);
        publisher.publish(StreamEvent::status("go")).await;
        drop(publisher);

        let events = drain(rx).await;
        assert_eq!(events.last(), Some(&StreamEvent::StreamEnd));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn disconnect_stops_delivery_silently() {
        let (mut publisher, rx) = StreamPublisher::channel(8);
        assert!(publisher.publish(StreamEvent::status("go")).await);
        drop(rx);

        assert!(!publisher.publish(StreamEvent::ThinkingStep { data: "x".into() }).await);
        assert!(!publisher.is_connected());
        assert_eq!(publisher.delivered(), 1);
        publisher.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reader_is_cut_off() {
        let (publisher, mut rx) = StreamPublisher::channel(2);
        let mut publisher = publisher.with_stall_timeout(Duration::from_millis(100));
        assert!(publisher.publish(StreamEvent::status("1")).await);
        assert!(publisher.publish(StreamEvent::status("2")).await);

        // The buffer is full and nobody reads: give up instead of waiting forever.
        assert!(!publisher.publish(StreamEvent::status("3")).await);
        assert!(!publisher.is_connected());
        assert!(!publisher.publish(StreamEvent::status("4")).await);
        publisher.finish().await;

        assert_eq!(rx.recv().await, Some(StreamEvent::status("1")));
        assert_eq!(rx.recv().await, Some(StreamEvent::status("2")));
        assert_eq!(rx.recv().await, None);
    }
}
