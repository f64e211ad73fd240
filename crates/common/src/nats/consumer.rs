use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, AckKind, Message};
use futures::{future::BoxFuture, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of processing one batch, by message index
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    /// Processed; acknowledge
    pub ack: Vec<usize>,
    /// Failed transiently; redeliver after the configured delay
    pub nak: Vec<(usize, Option<String>)>,
    /// Can never succeed (undecodable, unknown document); stop redelivery
    pub term: Vec<(usize, String)>,
}

impl ProcessingResult {
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            ..Default::default()
        }
    }

    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            nak: (0..count).map(|i| (i, error.clone())).collect(),
            ..Default::default()
        }
    }
}

/// Batch processor: receives raw messages and decides their acknowledgment
pub type BatchProcessor =
    Box<dyn Fn(&[Message]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Settings for a durable pull consumer
#[derive(Debug, Clone)]
pub struct NatsConsumerConfig {
    pub stream_name: String,
    pub consumer_name: String,
    pub subject_filter: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Delivery attempts before JetStream gives up on a message
    pub max_deliver: i64,
    /// Delay requested on Nak before the message is redelivered
    pub retry_delay: Duration,
}

/// Durable JetStream pull consumer driving a batch processor until cancelled
pub struct NatsConsumer {
    consumer: PullConsumer,
    config: NatsConsumerConfig,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        jetstream: &jetstream::Context,
        config: NatsConsumerConfig,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            subject = %config.subject_filter,
            "Creating JetStream consumer"
        );

        let consumer = jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(config.consumer_name.clone()),
                    durable_name: Some(config.consumer_name.clone()),
                    filter_subject: config.subject_filter.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: config.max_deliver,
                    ..Default::default()
                },
                config.stream_name.as_str(),
            )
            .await
            .context("Failed to create consumer")?;

        info!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            config,
            processor,
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(consumer = %self.config.consumer_name, "Starting consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.config.batch_size)
            .expires(self.config.max_wait)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut batch = Vec::new();
        while let Some(result) = messages.next().await {
            match result {
                Ok(msg) => batch.push(msg),
                Err(e) => warn!(error = %e, "Error receiving message from batch"),
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        debug!(message_count = batch.len(), "Received message batch");

        let outcome = match (self.processor)(&batch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Processor returned error, rejecting all messages");
                ProcessingResult::nak_all(batch.len(), Some(e.to_string()))
            }
        };

        for idx in outcome.ack {
            match batch.get(idx) {
                Some(msg) => {
                    if let Err(e) = msg.ack().await {
                        error!(error = %e, message_index = idx, "Failed to acknowledge message");
                    }
                }
                None => warn!(message_index = idx, "Invalid ack index in ProcessingResult"),
            }
        }

        for (idx, reason) in outcome.nak {
            match batch.get(idx) {
                Some(msg) => {
                    warn!(
                        message_index = idx,
                        subject = %msg.subject,
                        reason = reason.as_deref().unwrap_or("unspecified"),
                        "Rejecting message for redelivery"
                    );
                    if let Err(e) = msg
                        .ack_with(AckKind::Nak(Some(self.config.retry_delay)))
                        .await
                    {
                        error!(error = %e, message_index = idx, "Failed to reject message");
                    }
                }
                None => warn!(message_index = idx, "Invalid nak index in ProcessingResult"),
            }
        }

        for (idx, reason) in outcome.term {
            match batch.get(idx) {
                Some(msg) => {
                    error!(
                        message_index = idx,
                        subject = %msg.subject,
                        reason = %reason,
                        "Terminating message"
                    );
                    if let Err(e) = msg.ack_with(AckKind::Term).await {
                        error!(error = %e, message_index = idx, "Failed to terminate message");
                    }
                }
                None => warn!(message_index = idx, "Invalid term index in ProcessingResult"),
            }
        }

        Ok(())
    }
}
