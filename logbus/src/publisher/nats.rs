//! NATS sink
//!
//! One long-lived client per sink, connected on first use. A failed connection
//! is not cached; the next send tries again. After [`LogSink::shutdown`] the
//! connection is drained and every send fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::{jetstream, Client};
use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{Delivery, LogSink};
use crate::config::BusConfig;
use crate::error::{Error, Result};

/// Upper bound on the wait between connection attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Sink publishing to NATS, through JetStream by default
pub struct NatsSink {
    config: BusConfig,
    client: OnceCell<Client>,
    closed: AtomicBool,
}

impl std::fmt::Debug for NatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSink")
            .field("url", &self.config.url)
            .field("jetstream", &self.config.jetstream)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl NatsSink {
    /// Create a sink; no connection is made until the first send
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a sink around an already connected client
    pub fn with_client(config: BusConfig, client: Client) -> Self {
        Self {
            config,
            client: OnceCell::new_with(Some(client)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized() && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn client(&self) -> Result<&Client> {
        if self.is_closed() {
            return Err(Error::Bus("NATS sink is shut down".to_string()));
        }

        self.client
            .get_or_try_init(|| create_client(&self.config))
            .await
    }
}

#[async_trait]
impl LogSink for NatsSink {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Delivery> {
        let client = self.client().await?;

        if self.config.jetstream {
            let context = jetstream::new(client.clone());
            let ack = context
                .publish(topic.to_string(), payload.into())
                .await
                .map_err(|e| Error::Bus(format!("Failed to publish to {}: {}", topic, e)))?
                .await
                .map_err(|e| Error::Bus(format!("No acknowledgement from {}: {}", topic, e)))?;

            Ok(Delivery {
                topic: topic.to_string(),
                stream: Some(ack.stream),
                sequence: Some(ack.sequence),
            })
        } else {
            client
                .publish(topic.to_string(), payload.into())
                .await
                .map_err(|e| Error::Bus(format!("Failed to publish to {}: {}", topic, e)))?;
            client
                .flush()
                .await
                .map_err(|e| Error::Bus(format!("Failed to flush {}: {}", topic, e)))?;

            Ok(Delivery::unacknowledged(topic))
        }
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let Some(client) = self.client.get() else {
            return Ok(());
        };

        tokio::time::timeout(timeout, client.drain())
            .await
            .map_err(|_| Error::Timeout(timeout))?
            .map_err(|e| Error::Bus(format!("Failed to drain on shutdown: {}", e)))?;

        tracing::info!("NATS connection to {} drained", self.config.url);
        Ok(())
    }
}

/// Create a NATS client, retrying with exponential backoff
async fn create_client(config: &BusConfig) -> Result<Client> {
    if config.url.is_empty() {
        tracing::error!("No message bus address configured, log records will be dropped");
        return Err(Error::Bus("message bus address is not configured".to_string()));
    }

    let mut attempt = 0;
    let base_delay = config.retry_delay();

    loop {
        match try_create_client(config).await {
            Ok(client) => {
                if attempt > 0 {
                    tracing::info!(
                        "NATS connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!("NATS client connected to {}", config.url);
                }
                return Ok(client);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to NATS after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = backoff_delay(base_delay, attempt);

                tracing::warn!(
                    "NATS connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Exponential backoff for the given retry attempt, capped at [`MAX_BACKOFF`]
fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base_delay
        .checked_mul(2_u32.pow(exponent))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Attempt to create a NATS client (single try)
async fn try_create_client(config: &BusConfig) -> Result<Client> {
    let mut opts = async_nats::ConnectOptions::new();

    if let Some(name) = &config.name {
        opts = opts.name(name);
    }

    opts = opts.max_reconnects(Some(config.max_reconnects));

    opts.connect(config.url.as_str()).await.map_err(|e| {
        Error::Bus(format!(
            "Failed to connect to NATS server at '{}' (client name: {}): {}",
            config.url,
            config.name.as_deref().unwrap_or("<none>"),
            e
        ))
    })
}
