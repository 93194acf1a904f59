mod client;
mod config;
mod diff;
mod discovery;
mod error;
mod logger;
mod paths;
mod protocol;
mod session;
mod status;
mod transport;
mod types;
mod wait;

pub use client::{Request, RinnaiClient, RinnaiClientBuilder};
pub use config::{ClientConfig, IdleClose};
pub use discovery::{
    parse_announcement, resolve_address, resolve_address_on, DEFAULT_DISCOVERY_TIMEOUT,
    DISCOVERY_MAGIC, DISCOVERY_PORT,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use paths::{Field, PathTable, StatusPath, MODE_PLACEHOLDER, SYSTEM_GROUP};
pub use protocol::{command_body, Frame, FrameCodec, PendingCommand, SequenceNumber};
pub use status::{diff, enumerate_zones, Status};
pub use types::*;
