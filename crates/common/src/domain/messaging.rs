use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One rendered slot of a template message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TemplateField {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            color: None,
        }
    }

    pub fn colored(value: impl Into<String>, color: &str) -> Self {
        Self {
            value: value.into(),
            color: Some(color.to_string()),
        }
    }
}

/// Alarm notification template: title, device, position, info, time and remark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub first: TemplateField,
    pub keyword1: TemplateField,
    pub keyword2: TemplateField,
    pub keyword3: TemplateField,
    pub keyword4: TemplateField,
    pub remark: TemplateField,
}

/// Delivery request for a rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendDocRequest {
    pub app: String,
    pub doctype: String,
    pub name: String,
    pub recipients: Vec<String>,
    pub template: TemplateMessage,
}

/// Outbound messaging gateway
///
/// `send_with_retry` only queues the document; the gateway redelivers until the
/// document is rendered and handed to `send_doc`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Queue a document for notification with retry
    async fn send_with_retry(&self, doctype: &str, name: &str) -> DomainResult<()>;

    /// Deliver a rendered document to the recipients through an app
    async fn send_doc(&self, request: SendDocRequest) -> DomainResult<()>;

    /// Purge any message previously sent for the document
    async fn clean_doc(&self, doctype: &str, name: &str) -> DomainResult<()>;
}
