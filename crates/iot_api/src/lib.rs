pub mod domain;
pub mod notification_worker;

pub use domain::*;
pub use notification_worker::*;
