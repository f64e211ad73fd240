use crate::nats::traits::JetStreamPublisher;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Settings for a stream created on startup
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub name: String,
    pub description: String,
    /// Undelivered jobs older than this are dropped by the server
    pub max_age: Duration,
    pub duplicate_window: Duration,
}

impl StreamSettings {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            duplicate_window: Duration::from_secs(120),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Create the stream covering `<name>.*` unless it already exists
    ///
    /// An existing stream is left untouched even if its settings differ.
    pub async fn ensure_stream(&self, settings: &StreamSettings) -> Result<()> {
        info!(stream = %settings.name, "Ensuring stream exists");

        if self.jetstream.get_stream(&settings.name).await.is_ok() {
            info!(stream = %settings.name, "Stream already exists");
            return Ok(());
        }

        self.jetstream
            .create_stream(StreamConfig {
                name: settings.name.clone(),
                subjects: vec![format!("{}.*", settings.name)],
                description: Some(settings.description.clone()),
                max_age: settings.max_age,
                duplicate_window: settings.duplicate_window,
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to create stream {}", settings.name))?;

        info!(stream = %settings.name, max_age_secs = settings.max_age.as_secs(), "Created stream");
        Ok(())
    }

    /// Push out buffered messages before shutdown
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Create a JetStreamPublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }
}

/// Concrete implementation of JetStreamPublisher using async-nats
pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(skip(self, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()> {
        let ack = self
            .context
            .publish(subject, payload)
            .await
            .context("Failed to publish message to JetStream")?;

        ack.await
            .context("Failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}
