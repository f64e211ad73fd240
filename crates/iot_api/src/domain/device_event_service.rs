use crate::domain::{AccessScoper, NotificationDispatcher};
use chrono::{DateTime, Utc};
use common::domain::{
    Actor, CountDeviceEventsRepoInput, CreateDeviceEventRepoInput, DeviceEvent,
    DeviceEventRepository, Disposal, DisposeDeviceEventRepoInput, DomainError, DomainResult,
    EventFilters, EventScope, ListDeviceEventsRepoInput, Owner, Pagination,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ============================================================================
// Service Request Types
// ============================================================================

/// Request to record a new device event (ingestion entry point)
#[derive(Debug, Clone, Validate)]
pub struct CreateDeviceEventRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(length(min = 1))]
    pub event_source: String,
    #[garde(range(min = 0))]
    pub event_level: i32,
    #[garde(length(min = 1))]
    pub event_type: String,
    #[garde(skip)]
    pub event_info: String,
    #[garde(skip)]
    pub event_data: String,
    #[garde(skip)]
    pub event_time: DateTime<Utc>,
    #[garde(skip)]
    pub owner: Owner,
    #[garde(skip)]
    pub owner_company: Option<String>,
    #[garde(skip)]
    pub wechat_notify: bool,
}

/// Request addressing a single event on behalf of an actor
#[derive(Debug, Clone, Validate)]
pub struct DeviceEventRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub event_id: String,
}

/// Personal listing: events owned by the actor or one of their groups
#[derive(Debug, Clone, Validate)]
pub struct ListUserEventsRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(skip)]
    pub filters: EventFilters,
    #[garde(skip)]
    pub pagination: Pagination,
}

/// Device listing; without a serial (or with an empty one) it falls back to
/// the personal listing
#[derive(Debug, Clone, Validate)]
pub struct ListDeviceEventsRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(skip)]
    pub device_id: Option<String>,
    #[garde(skip)]
    pub filters: EventFilters,
    #[garde(skip)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Validate)]
pub struct ListCompanyEventsRequest {
    #[garde(length(min = 1))]
    pub company_id: String,
    #[garde(skip)]
    pub filters: EventFilters,
    #[garde(skip)]
    pub pagination: Pagination,
}

/// Domain service for device event reads, disposal and lifecycle hooks
pub struct DeviceEventService {
    event_repository: Arc<dyn DeviceEventRepository>,
    access_scoper: Arc<AccessScoper>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl DeviceEventService {
    pub fn new(
        event_repository: Arc<dyn DeviceEventRepository>,
        access_scoper: Arc<AccessScoper>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            event_repository,
            access_scoper,
            dispatcher,
        }
    }

    async fn load_event(&self, event_id: &str) -> DomainResult<DeviceEvent> {
        self.event_repository
            .get_event(event_id)
            .await?
            .ok_or_else(|| DomainError::DeviceEventNotFound(event_id.to_string()))
    }

    /// Load an event and check the actor may read it
    async fn load_readable_event(&self, actor: &Actor, event_id: &str) -> DomainResult<DeviceEvent> {
        if !actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }
        let event = self.load_event(event_id).await?;
        self.access_scoper.require_read(actor, &event).await?;
        Ok(event)
    }

    /// Persist a new event and fire the creation notification
    #[instrument(skip(self, request), fields(device_id = %request.device_id, event_type = %request.event_type))]
    pub async fn create_event(&self, request: CreateDeviceEventRequest) -> DomainResult<DeviceEvent> {
        common::garde::validate_struct(&request)?;

        let event_id = xid::new().to_string();
        debug!(event_id = %event_id, "creating device event");

        let event = self
            .event_repository
            .create_event(CreateDeviceEventRepoInput {
                id: event_id,
                device_id: request.device_id,
                event_source: request.event_source,
                event_level: request.event_level,
                event_type: request.event_type,
                event_info: request.event_info,
                event_data: request.event_data,
                event_time: request.event_time,
                owner: request.owner,
                owner_company: request.owner_company,
                wechat_notify: request.wechat_notify,
            })
            .await?;

        self.dispatcher.on_event_created(&event).await;

        info!(event_id = %event.id, "device event created");
        Ok(event)
    }

    #[instrument(skip(self, request), fields(event_id = %request.event_id, user_id = %request.actor.user_id))]
    pub async fn get_event(&self, request: DeviceEventRequest) -> DomainResult<DeviceEvent> {
        common::garde::validate_struct(&request)?;
        self.load_readable_event(&request.actor, &request.event_id)
            .await
    }

    /// Mark an event as handled by the actor and notify again
    #[instrument(skip(self, request), fields(event_id = %request.event_id, user_id = %request.actor.user_id))]
    pub async fn dispose_event(&self, request: DeviceEventRequest) -> DomainResult<DeviceEvent> {
        common::garde::validate_struct(&request)?;

        let event = self
            .load_readable_event(&request.actor, &request.event_id)
            .await?;
        if event.is_disposed() {
            return Err(DomainError::DeviceEventAlreadyDisposed(event.id));
        }

        let disposed = self
            .event_repository
            .dispose_event(DisposeDeviceEventRepoInput {
                id: event.id,
                disposal: Disposal {
                    disposed_by: request.actor.user_id.clone(),
                    disposed_at: Utc::now(),
                },
            })
            .await?;

        self.dispatcher.on_event_disposed(&disposed).await;

        info!("device event disposed");
        Ok(disposed)
    }

    /// Permanently remove an event and purge its sent messages
    #[instrument(skip(self, request), fields(event_id = %request.event_id, user_id = %request.actor.user_id))]
    pub async fn delete_event(&self, request: DeviceEventRequest) -> DomainResult<()> {
        common::garde::validate_struct(&request)?;

        let event = self
            .load_readable_event(&request.actor, &request.event_id)
            .await?;

        if !self.event_repository.delete_event(&event.id).await? {
            return Err(DomainError::DeviceEventNotFound(event.id));
        }

        self.dispatcher.on_event_deleted(&event.id).await;

        info!("device event deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(user_id = %request.actor.user_id))]
    pub async fn list_user_events(
        &self,
        request: ListUserEventsRequest,
    ) -> DomainResult<Vec<DeviceEvent>> {
        if !request.actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }

        let input = self
            .access_scoper
            .list_visible_events_input(&request.actor.user_id, request.filters, request.pagination)
            .await?;
        let events = self.event_repository.list_events(input).await?;

        debug!(count = events.len(), "listed user events");
        Ok(events)
    }

    pub async fn count_user_events(&self, actor: &Actor, filters: EventFilters) -> DomainResult<u64> {
        if !actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }

        let input = self
            .access_scoper
            .count_visible_events_input(&actor.user_id, filters)
            .await?;
        self.event_repository.count_events(input).await
    }

    #[instrument(skip(self, request), fields(device_id = ?request.device_id, user_id = %request.actor.user_id))]
    pub async fn list_device_events(
        &self,
        request: ListDeviceEventsRequest,
    ) -> DomainResult<Vec<DeviceEvent>> {
        common::garde::validate_struct(&request)?;

        match request.device_id.filter(|device_id| !device_id.is_empty()) {
            Some(device_id) => {
                self.event_repository
                    .list_events(ListDeviceEventsRepoInput {
                        scope: EventScope::Device(device_id),
                        filters: request.filters,
                        pagination: request.pagination,
                    })
                    .await
            }
            None => {
                self.list_user_events(ListUserEventsRequest {
                    actor: request.actor,
                    filters: request.filters,
                    pagination: request.pagination,
                })
                .await
            }
        }
    }

    pub async fn count_device_events(
        &self,
        actor: &Actor,
        device_id: Option<&str>,
        filters: EventFilters,
    ) -> DomainResult<u64> {
        match device_id {
            Some(device_id) if !device_id.is_empty() => {
                self.event_repository
                    .count_events(CountDeviceEventsRepoInput {
                        scope: EventScope::Device(device_id.to_string()),
                        filters,
                    })
                    .await
            }
            _ => self.count_user_events(actor, filters).await,
        }
    }

    #[instrument(skip(self, request), fields(company_id = %request.company_id))]
    pub async fn list_company_events(
        &self,
        request: ListCompanyEventsRequest,
    ) -> DomainResult<Vec<DeviceEvent>> {
        common::garde::validate_struct(&request)?;

        self.event_repository
            .list_events(ListDeviceEventsRepoInput {
                scope: EventScope::Company(request.company_id),
                filters: request.filters,
                pagination: request.pagination,
            })
            .await
    }

    pub async fn count_company_events(
        &self,
        company_id: &str,
        filters: EventFilters,
    ) -> DomainResult<u64> {
        if company_id.is_empty() {
            return Err(DomainError::ValidationError(
                "company_id: length is lower than 1".to_string(),
            ));
        }

        self.event_repository
            .count_events(CountDeviceEventsRepoInput {
                scope: EventScope::Company(company_id.to_string()),
                filters,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{device, event, manager, user};
    use common::domain::{
        MockCompanyDirectory, MockDeviceEventRepository, MockDeviceRepository,
        MockIdentityDirectory, MockMessagingGateway, DEVICE_EVENT_DOCTYPE,
    };

    struct Fixture {
        events: MockDeviceEventRepository,
        gateway: MockMessagingGateway,
        directory: MockCompanyDirectory,
        devices: MockDeviceRepository,
    }

    impl Fixture {
        fn new() -> Self {
            let mut directory = MockCompanyDirectory::new();
            directory
                .expect_get_company_admin()
                .returning(|_| Ok(Some("admin@company-1.com".to_string())));
            directory
                .expect_get_messaging_app()
                .returning(|_| Ok(Some("wechat-app".to_string())));
            directory.expect_list_user_groups().returning(|_| Ok(vec![]));

            let mut devices = MockDeviceRepository::new();
            devices
                .expect_get_device()
                .returning(|serial| Ok(Some(device(serial, "company-1"))));

            Self {
                events: MockDeviceEventRepository::new(),
                gateway: MockMessagingGateway::new(),
                directory,
                devices,
            }
        }

        fn service(self) -> DeviceEventService {
            let directory: Arc<dyn common::domain::CompanyDirectory> = Arc::new(self.directory);
            let events: Arc<dyn DeviceEventRepository> = Arc::new(self.events);
            let dispatcher = NotificationDispatcher::new(
                Arc::new(self.gateway),
                directory.clone(),
                Arc::new(MockIdentityDirectory::new()),
                Arc::new(self.devices),
                events.clone(),
            );
            DeviceEventService::new(
                events,
                Arc::new(AccessScoper::new(directory)),
                Arc::new(dispatcher),
            )
        }
    }

    fn create_request(wechat_notify: bool) -> CreateDeviceEventRequest {
        CreateDeviceEventRequest {
            device_id: "SN-1".to_string(),
            event_source: "sensor".to_string(),
            event_level: 3,
            event_type: "alarm".to_string(),
            event_info: "Over temperature".to_string(),
            event_data: "{\"temp\":97.5}".to_string(),
            event_time: Utc::now(),
            owner: Owner::User("alice@example.com".to_string()),
            owner_company: Some("company-1".to_string()),
            wechat_notify,
        }
    }

    fn stored(input: CreateDeviceEventRepoInput) -> DeviceEvent {
        let mut evt = event(&input.id, input.wechat_notify);
        evt.device_id = input.device_id;
        evt.owner = input.owner;
        evt
    }

    #[tokio::test]
    async fn test_create_event_with_notify_sends_once() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_create_event()
            .withf(|input: &CreateDeviceEventRepoInput| !input.id.is_empty() && input.device_id == "SN-1")
            .times(1)
            .returning(|input| Ok(stored(input)));
        fixture
            .gateway
            .expect_send_with_retry()
            .times(1)
            .returning(|_, _| Ok(()));

        let service = fixture.service();
        let created = service.create_event(create_request(true)).await.unwrap();
        assert_eq!(created.device_id, "SN-1");
    }

    #[tokio::test]
    async fn test_create_event_without_notify_never_sends() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_create_event()
            .returning(|input| Ok(stored(input)));
        fixture.gateway.expect_send_with_retry().times(0);

        let service = fixture.service();
        service.create_event(create_request(false)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_event_rejects_missing_device() {
        let mut fixture = Fixture::new();
        fixture.events.expect_create_event().times(0);

        let service = fixture.service();
        let mut request = create_request(true);
        request.device_id = String::new();

        let result = service.create_event(request).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_event_survives_gateway_failure() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_create_event()
            .returning(|input| Ok(stored(input)));
        fixture
            .gateway
            .expect_send_with_retry()
            .returning(|_, _| Err(DomainError::MessagingError("unreachable".to_string())));

        let service = fixture.service();
        assert!(service.create_event(create_request(true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispose_sets_disposer_and_notifies_again() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_get_event()
            .returning(|id| Ok(Some(event(id, true))));
        fixture
            .events
            .expect_dispose_event()
            .withf(|input: &DisposeDeviceEventRepoInput| {
                input.id == "evt-1" && input.disposal.disposed_by == "alice@example.com"
            })
            .times(1)
            .returning(|input| {
                let mut evt = event(&input.id, true);
                evt.disposal = Some(input.disposal);
                Ok(evt)
            });
        fixture
            .gateway
            .expect_send_with_retry()
            .withf(|doctype: &str, name: &str| doctype == DEVICE_EVENT_DOCTYPE && name == "evt-1")
            .times(1)
            .returning(|_, _| Ok(()));

        let service = fixture.service();
        let disposed = service
            .dispose_event(DeviceEventRequest {
                actor: user("alice@example.com"),
                event_id: "evt-1".to_string(),
            })
            .await
            .unwrap();

        assert!(disposed.is_disposed());
        assert_eq!(disposed.disposed_by(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_dispose_twice_is_rejected_without_notification() {
        let mut fixture = Fixture::new();
        fixture.events.expect_get_event().returning(|id| {
            let mut evt = event(id, true);
            evt.disposal = Some(Disposal {
                disposed_by: "alice@example.com".to_string(),
                disposed_at: Utc::now(),
            });
            Ok(Some(evt))
        });
        fixture.events.expect_dispose_event().times(0);
        fixture.gateway.expect_send_with_retry().times(0);

        let service = fixture.service();
        let result = service
            .dispose_event(DeviceEventRequest {
                actor: user("alice@example.com"),
                event_id: "evt-1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::DeviceEventAlreadyDisposed(_))));
    }

    #[tokio::test]
    async fn test_dispose_by_stranger_is_denied() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_get_event()
            .returning(|id| Ok(Some(event(id, true))));
        fixture.events.expect_dispose_event().times(0);

        let service = fixture.service();
        let result = service
            .dispose_event(DeviceEventRequest {
                actor: user("mallory@example.com"),
                event_id: "evt-1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_anonymous_actor_is_unauthenticated() {
        let fixture = Fixture::new();
        let service = fixture.service();

        let result = service
            .get_event(DeviceEventRequest {
                actor: user(""),
                event_id: "evt-1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_get_missing_event_is_not_found() {
        let mut fixture = Fixture::new();
        fixture.events.expect_get_event().returning(|_| Ok(None));

        let service = fixture.service();
        let result = service
            .get_event(DeviceEventRequest {
                actor: manager("boss"),
                event_id: "evt-404".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::DeviceEventNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_event_cleans_sent_messages() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_get_event()
            .returning(|id| Ok(Some(event(id, true))));
        fixture
            .events
            .expect_delete_event()
            .withf(|id: &str| id == "evt-1")
            .times(1)
            .returning(|_| Ok(true));
        fixture
            .gateway
            .expect_clean_doc()
            .withf(|doctype: &str, name: &str| doctype == DEVICE_EVENT_DOCTYPE && name == "evt-1")
            .times(1)
            .returning(|_, _| Ok(()));

        let service = fixture.service();
        service
            .delete_event(DeviceEventRequest {
                actor: manager("boss"),
                event_id: "evt-1".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_listing_scopes_to_groups_and_self() {
        let mut fixture = Fixture::new();
        fixture.directory = MockCompanyDirectory::new();
        fixture
            .directory
            .expect_list_user_groups()
            .returning(|_| Ok(vec!["group-1".to_string()]));
        fixture
            .events
            .expect_list_events()
            .withf(|input: &ListDeviceEventsRepoInput| {
                input.scope
                    == EventScope::OwnerIn(vec![
                        "group-1".to_string(),
                        "bob@example.com".to_string(),
                    ])
                    && input.filters.disposed == Some(false)
                    && input.pagination.limit == Some(20)
            })
            .times(1)
            .returning(|_| Ok(vec![event("evt-1", false)]));

        let service = fixture.service();
        let events = service
            .list_user_events(ListUserEventsRequest {
                actor: user("bob@example.com"),
                filters: EventFilters {
                    disposed: Some(false),
                    ..Default::default()
                },
                pagination: Pagination {
                    start: 0,
                    limit: Some(20),
                },
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_manager_listing_is_not_widened() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_list_events()
            .withf(|input: &ListDeviceEventsRepoInput| {
                input.scope == EventScope::OwnerIn(vec!["boss".to_string()])
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let service = fixture.service();
        service
            .list_user_events(ListUserEventsRequest {
                actor: manager("boss"),
                filters: EventFilters::default(),
                pagination: Pagination::default(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_device_listing_without_serial_falls_back_to_user_scope() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_list_events()
            .withf(|input: &ListDeviceEventsRepoInput| {
                matches!(input.scope, EventScope::OwnerIn(_))
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let service = fixture.service();
        service
            .list_device_events(ListDeviceEventsRequest {
                actor: user("bob@example.com"),
                device_id: None,
                filters: EventFilters::default(),
                pagination: Pagination::default(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_serial_falls_back_to_user_scope_for_list_and_count() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_list_events()
            .withf(|input: &ListDeviceEventsRepoInput| {
                matches!(input.scope, EventScope::OwnerIn(_))
            })
            .times(1)
            .returning(|_| Ok(vec![]));
        fixture
            .events
            .expect_count_events()
            .withf(|input: &CountDeviceEventsRepoInput| {
                matches!(input.scope, EventScope::OwnerIn(_))
            })
            .times(1)
            .returning(|_| Ok(0));

        let service = fixture.service();
        service
            .list_device_events(ListDeviceEventsRequest {
                actor: user("bob@example.com"),
                device_id: Some(String::new()),
                filters: EventFilters::default(),
                pagination: Pagination::default(),
            })
            .await
            .unwrap();
        let count = service
            .count_device_events(&user("bob@example.com"), Some(""), EventFilters::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_device_and_company_counts_use_equality_scopes() {
        let mut fixture = Fixture::new();
        fixture
            .events
            .expect_count_events()
            .withf(|input: &CountDeviceEventsRepoInput| {
                input.scope == EventScope::Device("SN-1".to_string())
                    && input.filters.event_level == Some(3)
            })
            .times(1)
            .returning(|_| Ok(7));
        fixture
            .events
            .expect_count_events()
            .withf(|input: &CountDeviceEventsRepoInput| {
                input.scope == EventScope::Company("company-1".to_string())
            })
            .times(1)
            .returning(|_| Ok(42));

        let service = fixture.service();
        let filters = EventFilters {
            event_level: Some(3),
            ..Default::default()
        };
        assert_eq!(
            service
                .count_device_events(&user("bob@example.com"), Some("SN-1"), filters)
                .await
                .unwrap(),
            7
        );
        assert_eq!(
            service
                .count_company_events("company-1", EventFilters::default())
                .await
                .unwrap(),
            42
        );
    }

    #[tokio::test]
    async fn test_company_listing_requires_company() {
        let fixture = Fixture::new();
        let service = fixture.service();

        let result = service
            .list_company_events(ListCompanyEventsRequest {
                company_id: String::new(),
                filters: EventFilters::default(),
                pagination: Pagination::default(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }
}
