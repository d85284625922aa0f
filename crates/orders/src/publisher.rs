//! Background task draining published order events.

use event_store::EventEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawns a task that logs every event forwarded by the repository's
/// [`ChannelObserver`](orderbook::ChannelObserver).
///
/// The task ends once every sender has been dropped, and returns how many
/// events it saw.
pub fn spawn(mut receiver: mpsc::Receiver<EventEnvelope>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut published = 0u64;
        while let Some(event) = receiver.recv().await {
            published += 1;
            metrics::counter!(
                "orders_events_published_total",
                "event_type" => event.event_type.clone()
            )
            .increment(1);
            tracing::info!(
                aggregate_id = %event.aggregate_id,
                version = %event.version,
                event_type = %event.event_type,
                "event published"
            );
        }
        tracing::debug!(published, "event publisher stopped");
        published
    })
}
