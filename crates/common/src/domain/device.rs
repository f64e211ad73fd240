use crate::domain::owner::Owner;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A physical (or virtual-backed) IoT device, keyed by its serial number
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub serial: String,
    pub name: String,
    pub description: Option<String>,
    pub company_id: Option<String>,
    pub owner: Owner,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub use_beta: bool,
    pub use_beta_start_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Device {
    /// Position rendered as "longitude - latitude"
    pub fn position(&self) -> String {
        fn coordinate(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        format!("{} - {}", coordinate(self.longitude), coordinate(self.latitude))
    }
}

/// Repository input for creating a device
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDeviceRepoInput {
    pub serial: String,
    pub name: String,
    pub description: Option<String>,
    pub company_id: Option<String>,
    pub owner: Owner,
    pub use_beta: bool,
    pub use_beta_start_time: Option<DateTime<Utc>>,
}

/// Repository trait for device storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Create a new device
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device>;

    /// Get a device by serial
    async fn get_device(&self, serial: &str) -> DomainResult<Option<Device>>;

    /// Delete a device by serial, returns whether a row was removed
    async fn delete_device(&self, serial: &str) -> DomainResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(longitude: Option<f64>, latitude: Option<f64>) -> Device {
        Device {
            serial: "SN-1".to_string(),
            name: "Boiler".to_string(),
            description: None,
            company_id: Some("company-1".to_string()),
            owner: Owner::Company("company-1".to_string()),
            longitude,
            latitude,
            use_beta: false,
            use_beta_start_time: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_position_formats_longitude_then_latitude() {
        assert_eq!(device(Some(116.4), Some(39.9)).position(), "116.4 - 39.9");
    }

    #[test]
    fn test_position_with_unknown_coordinates() {
        assert_eq!(device(None, None).position(), " - ");
    }
}
