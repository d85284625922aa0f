//! Side-effect hooks invoked after events are appended.

use event_store::EventEnvelope;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Failure reported by an observer. Never fails the command that produced the
/// event; the repository logs and counts it.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("observer channel is full")]
    ChannelFull,

    #[error("observer channel is closed")]
    ChannelClosed,

    #[error("{0}")]
    Failed(String),
}

/// Hook invoked synchronously, once per appended event, after a successful
/// append.
///
/// Implementations must return quickly; hand work off to a task instead of
/// doing I/O inline (see [`ChannelObserver`]).
pub trait Observer: Send + Sync {
    /// Name used in logs when the observer fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, event: &EventEnvelope) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&EventEnvelope) -> Result<(), ObserverError> + Send + Sync,
{
    fn handle(&self, event: &EventEnvelope) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Forwards appended events to a bounded channel without blocking.
///
/// A full or closed channel is reported as an observer failure and the event
/// is dropped for this observer.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<EventEnvelope>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<EventEnvelope>) -> Self {
        Self { sender }
    }

    /// Creates an observer together with the receiving end of its channel.
    ///
    /// A `buffer` of zero is treated as one.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }
}

impl Observer for ChannelObserver {
    fn name(&self) -> &str {
        "channel"
    }

    fn handle(&self, event: &EventEnvelope) -> Result<(), ObserverError> {
        self.sender
            .try_send(event.clone())
            .map_err(|err| match err {
                TrySendError::Full(_) => ObserverError::ChannelFull,
                TrySendError::Closed(_) => ObserverError::ChannelClosed,
            })
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use event_store::Version;

    use super::*;

    fn envelope(version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new("order-1"))
            .aggregate_type("Order")
            .event_type("OrderAccepted")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn channel_observer_forwards_events() {
        let (observer, mut receiver) = ChannelObserver::channel(4);

        observer.handle(&envelope(1)).unwrap();
        observer.handle(&envelope(2)).unwrap();

        assert_eq!(receiver.recv().await.unwrap().version, Version::new(1));
        assert_eq!(receiver.recv().await.unwrap().version, Version::new(2));
    }

    #[test]
    fn channel_observer_reports_full_channel() {
        let (observer, _receiver) = ChannelObserver::channel(1);

        observer.handle(&envelope(1)).unwrap();
        assert!(matches!(
            observer.handle(&envelope(2)),
            Err(ObserverError::ChannelFull)
        ));
    }

    #[test]
    fn channel_observer_reports_closed_channel() {
        let (observer, receiver) = ChannelObserver::channel(1);
        drop(receiver);

        assert!(matches!(
            observer.handle(&envelope(1)),
            Err(ObserverError::ChannelClosed)
        ));
    }

    #[test]
    fn closures_are_observers() {
        let observer = |event: &EventEnvelope| {
            if event.version == Version::new(2) {
                Err(ObserverError::Failed("boom".to_string()))
            } else {
                Ok(())
            }
        };

        assert!(observer.handle(&envelope(1)).is_ok());
        assert!(observer.handle(&envelope(2)).is_err());
    }
}
