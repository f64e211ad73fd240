use crate::domain::owner::Owner;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Doctype name device events are registered under with the messaging gateway
pub const DEVICE_EVENT_DOCTYPE: &str = "IOT Device Event";

/// Acknowledgment of a device event by an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposal {
    pub disposed_by: String,
    pub disposed_at: DateTime<Utc>,
}

/// An alarm or status event raised by a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub id: String,
    pub device_id: String,
    pub event_source: String,
    pub event_level: i32,
    pub event_type: String,
    pub event_info: String,
    pub event_data: String,
    pub event_time: DateTime<Utc>,
    pub owner: Owner,
    pub owner_company: Option<String>,
    pub wechat_notify: bool,
    pub disposal: Option<Disposal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceEvent {
    pub fn is_disposed(&self) -> bool {
        self.disposal.is_some()
    }

    pub fn disposed_by(&self) -> Option<&str> {
        self.disposal.as_ref().map(|d| d.disposed_by.as_str())
    }
}

/// Repository input for inserting a device event with its generated ID
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDeviceEventRepoInput {
    pub id: String,
    pub device_id: String,
    pub event_source: String,
    pub event_level: i32,
    pub event_type: String,
    pub event_info: String,
    pub event_data: String,
    pub event_time: DateTime<Utc>,
    pub owner: Owner,
    pub owner_company: Option<String>,
    pub wechat_notify: bool,
}

/// Repository input for recording a disposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposeDeviceEventRepoInput {
    pub id: String,
    pub disposal: Disposal,
}

/// Row restriction applied before caller filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// owner_id is any of the listed identities
    OwnerIn(Vec<String>),
    /// owner_company equals the company
    Company(String),
    /// device equals the serial
    Device(String),
}

/// Optional equality/range filters supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilters {
    pub event_source: Option<String>,
    pub event_level: Option<i32>,
    pub event_type: Option<String>,
    pub disposed: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Offset pagination; `limit = None` returns every remaining row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub start: u64,
    pub limit: Option<u64>,
}

/// Repository input for listing events, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDeviceEventsRepoInput {
    pub scope: EventScope,
    pub filters: EventFilters,
    pub pagination: Pagination,
}

/// Repository input for counting events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountDeviceEventsRepoInput {
    pub scope: EventScope,
    pub filters: EventFilters,
}

/// Repository trait for device event storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceEventRepository: Send + Sync {
    /// Insert a new event
    async fn create_event(&self, input: CreateDeviceEventRepoInput) -> DomainResult<DeviceEvent>;

    /// Get an event by ID
    async fn get_event(&self, event_id: &str) -> DomainResult<Option<DeviceEvent>>;

    /// Record the disposal of an event and bump its modification time
    async fn dispose_event(&self, input: DisposeDeviceEventRepoInput) -> DomainResult<DeviceEvent>;

    /// Delete a single event, returns whether a row was removed
    async fn delete_event(&self, event_id: &str) -> DomainResult<bool>;

    /// List events matching scope and filters, ordered by creation time descending
    async fn list_events(&self, input: ListDeviceEventsRepoInput) -> DomainResult<Vec<DeviceEvent>>;

    /// Count events matching scope and filters
    async fn count_events(&self, input: CountDeviceEventsRepoInput) -> DomainResult<u64>;

    /// Delete every event created strictly before the cutoff, returns the number of rows removed
    async fn delete_events_created_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
