mod access_scoper;
mod device_event_service;
#[cfg(test)]
pub(crate) mod fixtures;
mod notification_dispatcher;
mod retention_sweeper;
mod share_group_service;
mod virtual_device_service;

pub use access_scoper::*;
pub use device_event_service::*;
pub use notification_dispatcher::*;
pub use retention_sweeper::*;
pub use share_group_service::*;
pub use virtual_device_service::*;
