//! Weather query protocol and its TCP servers.
//!
//! Exposes weather history, liveness and acquisition schedule over three
//! independent TCP ports. Each connection carries exactly one request and
//! one response.
//!
//! ## Architecture
//!
//! - `protocol`: Request/Response model, command ids and error codes
//! - `contract`: raw binary and JSON wire codecs behind one trait
//! - `transport`: TCP server base (accept loop, per-connection tasks, lifecycle)
//! - `methods`: repo command dispatch
//! - `status`: status-probe and channel-info handlers
//! - `client`: clients for all three servers

pub mod client;
pub mod contract;
pub mod methods;
pub mod protocol;
pub mod status;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::{WeatherChannelInfoProvider, WeatherDataSource};

pub use client::{ChannelInfoClient, Client, ClientError, ServerAvailabilityProvider, ServerStatus};
pub use contract::{ArgumentEncoding, Contract, ContractKind, JsonContract, ProtocolError, RawContract};
pub use methods::{Payload, RepoHandler};
pub use protocol::{Argument, Command, ErrorCode, Request, Response};
pub use status::{ChannelInfoHandler, StatusHandler};
pub use transport::{ClientHandler, ServerState, TcpServer};

pub type RepoServer = TcpServer<RepoHandler>;
pub type StatusServer = TcpServer<StatusHandler>;
pub type ChannelInfoServer = TcpServer<ChannelInfoHandler>;

impl RepoServer {
    pub fn repo(
        bind_addr: SocketAddr,
        source: Arc<dyn WeatherDataSource>,
        contract: ContractKind,
    ) -> Self {
        TcpServer::new(bind_addr, RepoHandler::new(source, contract))
    }
}

impl StatusServer {
    pub fn status(bind_addr: SocketAddr) -> Self {
        TcpServer::new(bind_addr, StatusHandler)
    }
}

impl ChannelInfoServer {
    pub fn channel_info(
        bind_addr: SocketAddr,
        provider: Arc<dyn WeatherChannelInfoProvider>,
    ) -> Self {
        TcpServer::new(bind_addr, ChannelInfoHandler::new(provider))
    }
}
