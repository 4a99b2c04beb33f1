//! In-process sink
//!
//! Keeps the most recent payloads in memory, evicting the oldest once the
//! capacity is reached. Useful in tests and for services that run without a
//! broker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{Delivery, LogSink};
use crate::error::{Error, Result};

/// A payload recorded by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl SentMessage {
    /// Decode the payload as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        self.decode()
    }

    /// Decode the payload into a record type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(Error::from)
    }
}

/// Messages kept by a [`MemorySink`] when no capacity is given
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Buffer {
    messages: VecDeque<SentMessage>,
    sent: u64,
}

/// Sink that records the most recent messages in memory
///
/// Clones share the same message list.
#[derive(Debug, Clone)]
pub struct MemorySink {
    buffer: Arc<Mutex<Buffer>>,
    capacity: usize,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink keeping at most `capacity` messages (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Arc::default(),
            capacity: capacity.max(1),
            failure: None,
            delay: None,
        }
    }

    /// A sink whose every send fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Wait this long before accepting each message
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Retained messages, oldest first
    pub fn messages(&self) -> Vec<SentMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    /// Messages sent to one topic, oldest first
    pub fn messages_for(&self, topic: &str) -> Vec<SentMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Messages accepted since creation, including evicted ones
    pub fn total_sent(&self) -> u64 {
        self.lock().sent
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // A poisoned buffer is still a valid list of messages
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Delivery> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref message) = self.failure {
            return Err(Error::Bus(message.clone()));
        }

        let mut buffer = self.lock();
        if buffer.messages.len() >= self.capacity {
            buffer.messages.pop_front();
        }
        buffer.messages.push_back(SentMessage {
            topic: topic.to_string(),
            payload,
        });
        buffer.sent += 1;

        Ok(Delivery {
            topic: topic.to_string(),
            stream: None,
            sequence: Some(buffer.sent),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let first = sink.send("a", b"1".to_vec()).await.unwrap();
        let second = sink.send("b", b"2".to_vec()).await.unwrap();

        assert_eq!(first.sequence, Some(1));
        assert_eq!(second.sequence, Some(2));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.messages_for("b")[0].payload, b"2".to_vec());

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let sink = MemorySink::with_capacity(2);
        for topic in ["a", "b", "c"] {
            sink.send(topic, Vec::new()).await.unwrap();
        }

        let topics: Vec<_> = sink.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["b", "c"]);
        assert_eq!(sink.total_sent(), 3);

        let delivery = sink.send("d", Vec::new()).await.unwrap();
        assert_eq!(delivery.sequence, Some(4));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(MemorySink::new().capacity(), DEFAULT_MEMORY_CAPACITY);
        assert_eq!(MemorySink::with_capacity(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_messages() {
        let sink = MemorySink::new();
        let clone = sink.clone();
        clone.send("a", b"{}".to_vec()).await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink() {
        let sink = MemorySink::failing("down");
        let err = sink.send("a", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Bus(ref m) if m == "down"));
        assert!(sink.is_empty());
    }
}
