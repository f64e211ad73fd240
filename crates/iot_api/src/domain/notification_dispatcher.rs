use common::domain::{
    CompanyDirectory, DeviceEvent, DeviceEventRepository, DeviceRepository, DomainError,
    DomainResult, IdentityDirectory, MessagingGateway, Owner, SendDocRequest, TemplateField,
    TemplateMessage, DEVICE_EVENT_DOCTYPE,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const TITLE_COLOR: &str = "#800000";
const DEVICE_COLOR: &str = "#000080";
const DETAIL_COLOR: &str = "#008000";

pub const NEW_ALARM_TITLE: &str = "Has new device alarm";
pub const DISPOSED_ALARM_TITLE: &str = "Alarm has been disposed";

/// What happened to a notification trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A send request was accepted by the gateway
    Submitted,
    /// The event does not ask for notification
    NotRequested,
    /// The owning company has no messaging app configured
    NoMessagingApp,
    /// The gateway or the app lookup failed; logged, not surfaced
    Failed,
}

/// Result of rendering and handing a queued event to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { recipients: usize },
    NoRecipients,
    NoMessagingApp,
}

/// Decides when device events notify their owners and renders the message
pub struct NotificationDispatcher {
    gateway: Arc<dyn MessagingGateway>,
    company_directory: Arc<dyn CompanyDirectory>,
    identity_directory: Arc<dyn IdentityDirectory>,
    device_repository: Arc<dyn DeviceRepository>,
    event_repository: Arc<dyn DeviceEventRepository>,
}

impl NotificationDispatcher {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        company_directory: Arc<dyn CompanyDirectory>,
        identity_directory: Arc<dyn IdentityDirectory>,
        device_repository: Arc<dyn DeviceRepository>,
        event_repository: Arc<dyn DeviceEventRepository>,
    ) -> Self {
        Self {
            gateway,
            company_directory,
            identity_directory,
            device_repository,
            event_repository,
        }
    }

    /// Creation hook: first notification for a new alarm
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn on_event_created(&self, event: &DeviceEvent) -> DispatchOutcome {
        self.submit(event).await
    }

    /// Dispose hook: second notification announcing the resolution
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn on_event_disposed(&self, event: &DeviceEvent) -> DispatchOutcome {
        self.submit(event).await
    }

    /// Deletion hook: purge whatever was sent for the event
    ///
    /// The gateway treats unknown documents as a no-op, so this is safe for
    /// events that never notified anyone.
    #[instrument(skip(self))]
    pub async fn on_event_deleted(&self, event_id: &str) {
        if let Err(e) = self.gateway.clean_doc(DEVICE_EVENT_DOCTYPE, event_id).await {
            warn!(error = %e, "failed to request message cleanup");
        }
    }

    async fn messaging_app(&self, event: &DeviceEvent) -> DomainResult<Option<String>> {
        match &event.owner_company {
            Some(company_id) => self.company_directory.get_messaging_app(company_id).await,
            None => Ok(None),
        }
    }

    async fn submit(&self, event: &DeviceEvent) -> DispatchOutcome {
        if !event.wechat_notify {
            debug!("notification not requested");
            return DispatchOutcome::NotRequested;
        }

        match self.messaging_app(event).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(owner_company = ?event.owner_company, "no messaging app configured");
                return DispatchOutcome::NoMessagingApp;
            }
            Err(e) => {
                warn!(error = %e, "messaging app lookup failed, skipping notification");
                return DispatchOutcome::Failed;
            }
        }

        match self
            .gateway
            .send_with_retry(DEVICE_EVENT_DOCTYPE, &event.id)
            .await
        {
            Ok(()) => {
                info!(disposed = event.is_disposed(), "notification submitted");
                DispatchOutcome::Submitted
            }
            Err(e) => {
                warn!(error = %e, "failed to submit notification");
                DispatchOutcome::Failed
            }
        }
    }

    /// Users addressed by an owner: the user, the group's members, or the company admin
    pub async fn find_recipients(&self, owner: &Owner) -> DomainResult<Vec<String>> {
        match owner {
            Owner::User(user_id) => Ok(vec![user_id.clone()]),
            Owner::CompanyGroup(group_id) => self.company_directory.list_group_users(group_id).await,
            Owner::Company(company_id) => Ok(self
                .company_directory
                .get_company_admin(company_id)
                .await?
                .into_iter()
                .collect()),
            Owner::Public => Ok(Vec::new()),
        }
    }

    /// Render the alarm template for an event in its current state
    pub async fn build_template(&self, event: &DeviceEvent) -> DomainResult<TemplateMessage> {
        let device = self.device_repository.get_device(&event.device_id).await?;
        let (device_name, position) = match &device {
            Some(device) => (device.name.clone(), device.position()),
            None => (event.device_id.clone(), " - ".to_string()),
        };

        let (title, remark) = match &event.disposal {
            Some(disposal) => {
                let full_name = self
                    .identity_directory
                    .get_full_name(&disposal.disposed_by)
                    .await?
                    .unwrap_or_else(|| disposal.disposed_by.clone());
                (
                    DISPOSED_ALARM_TITLE,
                    format!("Disposed by {}({})", full_name, disposal.disposed_by),
                )
            }
            None => (
                NEW_ALARM_TITLE,
                format!("Level: {}\nData: {}", event.event_level, event.event_data),
            ),
        };

        Ok(TemplateMessage {
            first: TemplateField::colored(title, TITLE_COLOR),
            keyword1: TemplateField::colored(device_name, DEVICE_COLOR),
            keyword2: TemplateField::colored(position, DEVICE_COLOR),
            keyword3: TemplateField::colored(event.event_info.clone(), DETAIL_COLOR),
            keyword4: TemplateField::colored(
                event.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                DETAIL_COLOR,
            ),
            remark: TemplateField::new(remark),
        })
    }

    /// Render a queued event and hand it to the gateway for delivery
    ///
    /// Invoked by the gateway's retry loop; an error here means "try again later".
    #[instrument(skip(self))]
    pub async fn deliver(&self, event_id: &str) -> DomainResult<DeliveryOutcome> {
        let event = self
            .event_repository
            .get_event(event_id)
            .await?
            .ok_or_else(|| DomainError::DeviceEventNotFound(event_id.to_string()))?;

        let recipients = self.find_recipients(&event.owner).await?;
        if recipients.is_empty() {
            debug!("event has no recipients");
            return Ok(DeliveryOutcome::NoRecipients);
        }

        let app = match self.messaging_app(&event).await? {
            Some(app) => app,
            None => return Ok(DeliveryOutcome::NoMessagingApp),
        };

        let template = self.build_template(&event).await?;
        let count = recipients.len();

        self.gateway
            .send_doc(SendDocRequest {
                app,
                doctype: DEVICE_EVENT_DOCTYPE.to_string(),
                name: event.id.clone(),
                recipients,
                template,
            })
            .await?;

        info!(recipients = count, "notification delivered to gateway");
        Ok(DeliveryOutcome::Delivered { recipients: count })
    }
}
