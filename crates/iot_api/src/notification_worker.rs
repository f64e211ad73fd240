use crate::domain::NotificationDispatcher;
use async_nats::jetstream::Message;
use common::domain::{DomainError, DEVICE_EVENT_DOCTYPE};
use common::nats::{BatchProcessor, NotificationJob, ProcessingResult};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What the consumer should do with a notification job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Transient failure, redeliver later
    Retry(String),
    /// The job can never succeed
    Discard(String),
}

/// Renders queued send jobs and hands them to the gateway
///
/// Consumes `<stream>.send`; redelivery on `Retry` gives the gateway its retry
/// semantics, bounded by the consumer's `max_deliver`.
pub struct NotificationWorker {
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotificationWorker {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn handle_job(&self, payload: &[u8]) -> JobOutcome {
        let job: NotificationJob = match serde_json::from_slice(payload) {
            Ok(job) => job,
            Err(e) => return JobOutcome::Discard(format!("undecodable job: {}", e)),
        };

        if job.doctype != DEVICE_EVENT_DOCTYPE {
            return JobOutcome::Discard(format!("unsupported doctype {}", job.doctype));
        }

        match self.dispatcher.deliver(&job.name).await {
            Ok(outcome) => {
                debug!(event_id = %job.name, ?outcome, "notification job handled");
                JobOutcome::Done
            }
            Err(e @ DomainError::DeviceEventNotFound(_)) => JobOutcome::Discard(e.to_string()),
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }

    pub async fn process_batch(&self, payloads: Vec<Vec<u8>>) -> ProcessingResult {
        let mut result = ProcessingResult::default();

        for (index, payload) in payloads.iter().enumerate() {
            match self.handle_job(payload).await {
                JobOutcome::Done => result.ack.push(index),
                JobOutcome::Retry(reason) => {
                    warn!(index, reason = %reason, "notification job will be retried");
                    result.nak.push((index, Some(reason)));
                }
                JobOutcome::Discard(reason) => {
                    error!(index, reason = %reason, "discarding notification job");
                    result.term.push((index, reason));
                }
            }
        }

        result
    }
}

/// Batch processor for `NatsConsumer` backed by a notification worker
pub fn create_notification_processor(worker: Arc<NotificationWorker>) -> BatchProcessor {
    Box::new(move |messages: &[Message]| {
        let payloads: Vec<Vec<u8>> = messages.iter().map(|m| m.payload.to_vec()).collect();
        let worker = worker.clone();
        async move { Ok::<_, anyhow::Error>(worker.process_batch(payloads).await) }.boxed()
    })
}
