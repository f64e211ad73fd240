mod actor;
mod device;
mod device_event;
mod directory;
mod messaging;
mod owner;
mod result;
mod share_group;
mod virtual_device;

pub use actor::*;
pub use device::*;
pub use device_event::*;
pub use directory::*;
pub use messaging::*;
pub use owner::*;
pub use result::*;
pub use share_group::*;
pub use virtual_device::*;
