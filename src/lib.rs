mod bridge;
mod cache;
mod config;
mod connection;
mod endpoint;
mod engine;
mod error;
mod logger;
mod poller;
mod protocol;
mod router;
mod transport;
mod types;

pub use bridge::{Bridge, BridgeBuilder};
pub use cache::StateCache;
pub use config::{Config, ZoneConfig};
pub use connection::ConnectionManager;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use poller::RefreshClass;
pub use protocol::{Command, Method, Request, Response, check_write_status};
pub use router::ResponseRouter;
pub use transport::{Credentials, GatewayTransport, Inbound, InboundSender, Origin, Transport};
pub use types::*;
