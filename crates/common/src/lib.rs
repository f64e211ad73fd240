pub mod domain;
pub mod garde;
pub mod nats;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCompanyDirectory;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceEventRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockIdentityDirectory;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMessagingGateway;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockShareGroupRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockVirtualDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
