use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device event not found: {0}")]
    DeviceEventNotFound(String),

    #[error("Device event already exists: {0}")]
    DeviceEventAlreadyExists(String),

    #[error("Device event already disposed: {0}")]
    DeviceEventAlreadyDisposed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device already exists: {0}")]
    DeviceAlreadyExists(String),

    #[error("Device {0} does not belong to company {1}")]
    DeviceCompanyMismatch(String, String),

    #[error("Share group not found: {0}")]
    ShareGroupNotFound(String),

    #[error("Share group already exists: {0}")]
    ShareGroupAlreadyExists(String),

    #[error("Cannot add employee {0} of company {1} into a share group")]
    CompanyStaffNotShareable(String, String),

    #[error("User {0} is not a member of company {1}")]
    NotCompanyMember(String, String),

    #[error("Virtual device not found: {0}")]
    VirtualDeviceNotFound(String),

    #[error("Virtual device already exists: {0}")]
    VirtualDeviceAlreadyExists(String),

    #[error("Virtual device count limitation reached for user {0} (max {1})")]
    VirtualDeviceQuotaExceeded(String, usize),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Dependent entity failure: {0}")]
    DependentEntityFailure(String),

    #[error("Messaging error: {0}")]
    MessagingError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
