// Outbound broker API clients
pub mod broker;

pub use broker::{BrokerClient, RawBar};
