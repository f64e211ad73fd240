mod client;
mod consumer;
mod messaging_gateway;
mod traits;

pub use client::*;
pub use consumer::*;
pub use messaging_gateway::*;
pub use traits::*;
