use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Maximum number of virtual devices a regular user may own
pub const VIRTUAL_DEVICE_QUOTA: usize = 5;

/// A user-created trial device, paired with a dependent `Device` of the same serial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice {
    pub serial: String,
    pub user_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Repository input for creating a virtual device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVirtualDeviceRepoInput {
    pub serial: String,
    pub user_id: String,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VirtualDeviceRepository: Send + Sync {
    async fn create_virtual_device(
        &self,
        input: CreateVirtualDeviceRepoInput,
    ) -> DomainResult<VirtualDevice>;

    async fn get_virtual_device(&self, serial: &str) -> DomainResult<Option<VirtualDevice>>;

    /// Returns whether a row was removed
    async fn delete_virtual_device(&self, serial: &str) -> DomainResult<bool>;

    async fn count_virtual_devices(&self, user_id: &str) -> DomainResult<u64>;

    async fn list_virtual_devices(&self, user_id: &str) -> DomainResult<Vec<VirtualDevice>>;
}
