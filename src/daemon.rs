use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::context::AppContext;
use crate::rpc::{ChannelInfoServer, RepoServer, StatusServer};

/// Addresses the servers actually bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub repo: SocketAddr,
    pub status: SocketAddr,
    pub channel_info: SocketAddr,
}

/// Owns the weather monitor and the three servers.
pub struct Daemon {
    ctx: AppContext,
    repo: RepoServer,
    status: StatusServer,
    channel_info: ChannelInfoServer,
}

impl Daemon {
    pub fn new(ctx: AppContext) -> Self {
        let config = &ctx.config;
        let repo = RepoServer::repo(
            config.repo_addr(),
            Arc::new(ctx.repo.clone()),
            config.contract(),
        );
        let status = StatusServer::status(config.status_addr());
        let channel_info = ChannelInfoServer::channel_info(
            config.channel_info_addr(),
            ctx.monitor.clone(),
        );

        Self {
            ctx,
            repo,
            status,
            channel_info,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Start the monitor and every server, returning once all of them
    /// accept connections. If one server fails to bind, the ones already
    /// started are stopped again.
    pub async fn start(&self) -> Result<BoundAddrs> {
        self.ctx.monitor.start();

        match self.start_servers() {
            Ok(addrs) => {
                tokio::join!(
                    self.repo.listening(),
                    self.status.listening(),
                    self.channel_info.listening()
                );
                info!(
                    repo = %addrs.repo,
                    status = %addrs.status,
                    channel_info = %addrs.channel_info,
                    contract = %self.ctx.config.contract(),
                    "Daemon started"
                );
                Ok(addrs)
            }
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    fn start_servers(&self) -> Result<BoundAddrs> {
        Ok(BoundAddrs {
            repo: self.repo.start().context("Failed to start repo server")?,
            status: self.status.start().context("Failed to start status server")?,
            channel_info: self
                .channel_info
                .start()
                .context("Failed to start channel-info server")?,
        })
    }

    pub async fn stop(&self) {
        self.repo.stop().await;
        self.status.stop().await;
        self.channel_info.stop().await;
        self.ctx.monitor.stop().await;
        info!("Daemon stopped");
    }

    /// Run until Ctrl-C, then shut down.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Shutdown requested");
        self.stop().await;
        Ok(())
    }
}
