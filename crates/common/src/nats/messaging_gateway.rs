use crate::domain::{DomainError, DomainResult, MessagingGateway, SendDocRequest};
use crate::nats::traits::JetStreamPublisher;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Reference to a document queued for notification or cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub doctype: String,
    pub name: String,
}

/// Messaging gateway publishing notification work onto a JetStream stream
///
/// Subjects under the stream:
/// - `<stream>.send`    documents awaiting render + delivery, consumed with redelivery
/// - `<stream>.deliver` rendered messages for the outbound WeChat bridge
/// - `<stream>.clean`   documents whose sent messages must be purged
pub struct NatsMessagingGateway {
    publisher: Arc<dyn JetStreamPublisher>,
    stream: String,
}

impl NatsMessagingGateway {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>, stream: impl Into<String>) -> Self {
        Self {
            publisher,
            stream: stream.into(),
        }
    }

    pub fn send_subject(&self) -> String {
        format!("{}.send", self.stream)
    }

    pub fn deliver_subject(&self) -> String {
        format!("{}.deliver", self.stream)
    }

    pub fn clean_subject(&self) -> String {
        format!("{}.clean", self.stream)
    }

    async fn publish_json<T: Serialize + Sync>(&self, subject: String, body: &T) -> DomainResult<()> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| DomainError::MessagingError(format!("failed to encode payload: {}", e)))?;

        self.publisher
            .publish(subject, payload.into())
            .await
            .map_err(|e| DomainError::MessagingError(format!("{:#}", e)))
    }
}

#[async_trait]
impl MessagingGateway for NatsMessagingGateway {
    #[instrument(skip(self))]
    async fn send_with_retry(&self, doctype: &str, name: &str) -> DomainResult<()> {
        let job = NotificationJob {
            doctype: doctype.to_string(),
            name: name.to_string(),
        };
        self.publish_json(self.send_subject(), &job).await?;
        debug!("queued notification");
        Ok(())
    }

    #[instrument(skip(self, request), fields(app = %request.app, name = %request.name, recipients = request.recipients.len()))]
    async fn send_doc(&self, request: SendDocRequest) -> DomainResult<()> {
        self.publish_json(self.deliver_subject(), &request).await?;
        debug!("handed message to outbound bridge");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clean_doc(&self, doctype: &str, name: &str) -> DomainResult<()> {
        let job = NotificationJob {
            doctype: doctype.to_string(),
            name: name.to_string(),
        };
        self.publish_json(self.clean_subject(), &job).await
    }
}
