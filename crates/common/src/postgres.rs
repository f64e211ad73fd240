mod client;
mod config;
mod device_event_repository;
mod device_repository;
mod directory;
mod share_group_repository;
mod virtual_device_repository;

pub use client::*;
pub use config::*;
pub use device_event_repository::*;
pub use device_repository::*;
pub use directory::*;
pub use share_group_repository::*;
pub use virtual_device_repository::*;
