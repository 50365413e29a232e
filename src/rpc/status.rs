//! Fixed-format side servers that bypass the contracts.
//!
//! - status probe: the client sends one byte `1`, the server answers `1`
//! - channel info: the server sends the milliseconds until the next weather
//!   acquisition as one little-endian `i64`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::core::WeatherChannelInfoProvider;

use super::transport::ClientHandler;

pub const STATUS_PROBE: u8 = 1;
pub const STATUS_AVAILABLE: u8 = 1;

/// Answers the liveness probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusHandler;

#[async_trait]
impl ClientHandler for StatusHandler {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn process_client(&self, mut stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let probe = stream.read_u8().await.context("Failed to read probe")?;
        if probe != STATUS_PROBE {
            warn!(server = "status", peer = %peer, probe, "Unexpected probe byte");
            bail!("unexpected probe byte {probe}");
        }

        stream.write_u8(STATUS_AVAILABLE).await?;
        stream.shutdown().await?;
        debug!(server = "status", peer = %peer, "Probe answered");
        Ok(())
    }
}

/// Reports when the next weather reading is due.
pub struct ChannelInfoHandler {
    provider: Arc<dyn WeatherChannelInfoProvider>,
}

impl ChannelInfoHandler {
    pub fn new(provider: Arc<dyn WeatherChannelInfoProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ClientHandler for ChannelInfoHandler {
    fn name(&self) -> &'static str {
        "channel-info"
    }

    async fn process_client(&self, mut stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        let millis = self
            .provider
            .millis_until_next_weather()
            .context("Failed to get next weather time")?;

        stream.write_i64_le(millis).await?;
        stream.shutdown().await?;
        debug!(server = "channel-info", peer = %peer, millis, "Next weather time sent");
        Ok(())
    }
}
