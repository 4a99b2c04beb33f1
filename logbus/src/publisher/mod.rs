//! Record publishing
//!
//! A [`Publisher`] serializes records to JSON and hands them to a [`LogSink`]
//! for delivery to a topic. Publishing is best-effort: failures are logged and
//! swallowed so that logging can never fail the request being logged.
//!
//! # Delivery
//!
//! With [`PublishMode::AwaitDelivery`] the caller waits for the sink to report
//! delivery, bounded by the flush timeout. With [`PublishMode::Detached`] the
//! same bounded send runs on a tracked task and the caller continues
//! immediately. Either way the send is abandoned once the timeout elapses.
//! [`Publisher::shutdown`] waits for tracked sends before closing the sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::task::TaskTracker;

use crate::config::{PublishConfig, PublishMode};
use crate::error::{Error, Result};

mod memory;
#[cfg(feature = "nats")]
mod nats;

pub use memory::{MemorySink, SentMessage, DEFAULT_MEMORY_CAPACITY};
#[cfg(feature = "nats")]
pub use nats::NatsSink;

/// Confirmation that a sink accepted a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the message was sent to
    pub topic: String,
    /// Stream that stored the message, when the transport reports one
    pub stream: Option<String>,
    /// Sequence number within the stream or sink
    pub sequence: Option<u64>,
}

impl Delivery {
    /// Delivery without stream acknowledgement details
    pub fn unacknowledged(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            stream: None,
            sequence: None,
        }
    }
}

/// Transport that delivers serialized records to a topic
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send one payload and wait for the transport to confirm it
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Delivery>;

    /// Flush outstanding messages and release the connection
    async fn shutdown(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// What happened to a published record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The sink confirmed delivery
    Delivered(Delivery),
    /// The sink reported a failure
    Failed,
    /// No confirmation within the flush timeout
    TimedOut,
    /// The record was not sent (disabled publisher, empty topic or
    /// serialization failure)
    Dropped,
    /// Handed to a background task
    Detached,
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }
}

/// Serializes records and sends them through a [`LogSink`]
///
/// Cheap to clone; build one at startup and share it.
#[derive(Clone)]
pub struct Publisher {
    sink: Option<Arc<dyn LogSink>>,
    flush_timeout: Duration,
    mode: PublishMode,
    detached: TaskTracker,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("enabled", &self.sink.is_some())
            .field("flush_timeout", &self.flush_timeout)
            .field("mode", &self.mode)
            .field("in_flight", &self.detached.len())
            .finish()
    }
}

impl Publisher {
    /// Create a publisher over the given sink
    pub fn new(sink: Arc<dyn LogSink>, config: &PublishConfig) -> Self {
        Self {
            sink: Some(sink),
            flush_timeout: config.flush_timeout(),
            mode: config.mode,
            detached: TaskTracker::new(),
        }
    }

    /// Create a publisher backed by a lazily connected NATS sink
    #[cfg(feature = "nats")]
    pub fn nats(config: &crate::config::Config) -> Self {
        Self::new(Arc::new(NatsSink::new(config.bus.clone())), &config.publish)
    }

    /// Create a publisher that drops every record
    pub fn disabled() -> Self {
        Self {
            sink: None,
            flush_timeout: PublishConfig::default().flush_timeout(),
            mode: PublishMode::default(),
            detached: TaskTracker::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Serialize `record` to JSON and send it to `topic`
    ///
    /// Never fails; every problem is logged and reflected in the returned
    /// outcome.
    pub async fn publish<T>(&self, record: &T, topic: &str) -> PublishOutcome
    where
        T: Serialize + ?Sized,
    {
        let Some(sink) = &self.sink else {
            tracing::trace!(topic, "Publisher disabled, dropping record");
            return PublishOutcome::Dropped;
        };

        if topic.is_empty() {
            tracing::warn!("No topic configured, dropping record");
            return PublishOutcome::Dropped;
        }

        let payload = match encode(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic, error = %e, "Failed to serialize record, dropping it");
                return PublishOutcome::Dropped;
            }
        };

        match self.mode {
            PublishMode::AwaitDelivery => {
                deliver(Arc::clone(sink), topic.to_string(), payload, self.flush_timeout).await
            }
            PublishMode::Detached => {
                self.detached.spawn(deliver(
                    Arc::clone(sink),
                    topic.to_string(),
                    payload,
                    self.flush_timeout,
                ));
                PublishOutcome::Detached
            }
        }
    }

    /// Wait for detached sends, then flush and close the underlying sink
    ///
    /// Each step is bounded by the flush timeout. Clones share the same set
    /// of detached sends.
    pub async fn shutdown(&self) {
        let Some(sink) = &self.sink else {
            return;
        };

        self.detached.close();
        if tokio::time::timeout(self.flush_timeout, self.detached.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.detached.len(),
                "Detached log records still in flight at shutdown"
            );
        }

        match sink.shutdown(self.flush_timeout).await {
            Ok(()) => tracing::info!("Log publisher shut down"),
            Err(e) => tracing::warn!(error = %e, "Log publisher shutdown incomplete"),
        }
    }
}

fn encode<T>(record: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(record).map_err(Error::from)
}

async fn deliver(
    sink: Arc<dyn LogSink>,
    topic: String,
    payload: Vec<u8>,
    timeout: Duration,
) -> PublishOutcome {
    match tokio::time::timeout(timeout, sink.send(&topic, payload)).await {
        Ok(Ok(delivery)) => {
            tracing::debug!(
                topic = %delivery.topic,
                stream = ?delivery.stream,
                sequence = ?delivery.sequence,
                "Delivered log record"
            );
            PublishOutcome::Delivered(delivery)
        }
        Ok(Err(e)) => {
            tracing::warn!(topic = %topic, error = %e, "Log record delivery failed");
            PublishOutcome::Failed
        }
        Err(_) => {
            tracing::warn!(
                topic = %topic,
                timeout_ms = timeout.as_millis() as u64,
                "Timed out waiting for log record delivery"
            );
            PublishOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;

    fn publisher(sink: &MemorySink, mode: PublishMode, timeout_ms: u64) -> Publisher {
        Publisher::new(
            Arc::new(sink.clone()),
            &PublishConfig {
                flush_timeout_ms: timeout_ms,
                mode,
            },
        )
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("not serializable"))
        }
    }

    #[tokio::test]
    async fn test_publish_sends_json() {
        let sink = MemorySink::new();
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 1_000);

        let outcome = publisher.publish(&json!({"error_code": "5000"}), "errors").await;

        assert!(outcome.is_delivered());
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "errors");
        assert_eq!(messages[0].json().unwrap(), json!({"error_code": "5000"}));
    }

    #[tokio::test]
    async fn test_publish_is_not_idempotent() {
        let sink = MemorySink::new();
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 1_000);
        let record = json!({"message": "same"});

        publisher.publish(&record, "events").await;
        publisher.publish(&record, "events").await;

        assert_eq!(sink.messages_for("events").len(), 2);
    }

    #[tokio::test]
    async fn test_empty_topic_is_dropped() {
        let sink = MemorySink::new();
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 1_000);

        let outcome = publisher.publish(&json!({}), "").await;

        assert_eq!(outcome, PublishOutcome::Dropped);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_serialization_failure_is_dropped() {
        let sink = MemorySink::new();
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 1_000);

        let outcome = publisher.publish(&Unserializable, "errors").await;

        assert_eq!(outcome, PublishOutcome::Dropped);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = MemorySink::failing("broker unavailable");
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 1_000);

        let outcome = publisher.publish(&json!({}), "errors").await;

        assert_eq!(outcome, PublishOutcome::Failed);
    }

    #[tokio::test]
    async fn test_slow_sink_times_out() {
        let sink = MemorySink::new().with_delay(Duration::from_secs(5));
        let publisher = publisher(&sink, PublishMode::AwaitDelivery, 50);

        let outcome = publisher.publish(&json!({}), "errors").await;

        assert_eq!(outcome, PublishOutcome::TimedOut);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_detached_publish_delivers_in_background() {
        let sink = MemorySink::new();
        let publisher = publisher(&sink, PublishMode::Detached, 1_000);

        let outcome = publisher.publish(&json!({"n": 1}), "audit").await;
        assert_eq!(outcome, PublishOutcome::Detached);

        for _ in 0..100 {
            if !sink.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.messages_for("audit").len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_detached_sends() {
        let sink = MemorySink::new().with_delay(Duration::from_millis(200));
        let publisher = publisher(&sink, PublishMode::Detached, 1_000);

        let outcome = publisher.publish(&json!({"n": 1}), "audit").await;
        assert_eq!(outcome, PublishOutcome::Detached);

        publisher.clone().shutdown().await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_publisher_drops() {
        let publisher = Publisher::disabled();
        assert!(!publisher.is_enabled());
        assert_eq!(
            publisher.publish(&json!({}), "errors").await,
            PublishOutcome::Dropped
        );
        publisher.shutdown().await;
    }
}
