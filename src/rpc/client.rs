//! Clients for the three servers.
//!
//! Every call opens a fresh connection, performs one exchange and closes
//! it. Connect and exchange are each bounded by the configured timeout.
//! There is no retry.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::serialization::ReadObject;

use super::contract::{Contract, ContractKind, ProtocolError};
use super::protocol::{Argument, Command, ErrorCode, Request, Response};
use super::status::{STATUS_AVAILABLE, STATUS_PROBE};

/// Error returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("server returned {0}")]
    Server(ErrorCode),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Protocol(ProtocolError::Io(e))
    }
}

async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ClientError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ClientError::Connect { addr, source }),
        Err(_) => Err(ClientError::Timeout(timeout)),
    }
}

async fn bounded<T>(
    timeout: Duration,
    exchange: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

/// Client of the repo server.
#[derive(Debug, Clone)]
pub struct Client {
    addr: SocketAddr,
    contract: ContractKind,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: SocketAddr, contract: ContractKind, timeout: Duration) -> Self {
        Self {
            addr,
            contract,
            timeout,
        }
    }

    /// Send `command` and unwrap the answer: `Empty` is `None`, `Error`
    /// becomes [`ClientError::Server`].
    pub async fn request<T>(
        &self,
        command: Command,
        argument: impl Into<Argument>,
    ) -> Result<Option<T>, ClientError>
    where
        T: ReadObject + DeserializeOwned + Send,
    {
        match self
            .request_raw_response(Request::new(command, argument))
            .await?
        {
            Response::Empty => Ok(None),
            Response::Error(code) => Err(ClientError::Server(code)),
            Response::Ok(value) => Ok(Some(value)),
        }
    }

    /// Send `request` and return the response as received.
    pub async fn request_raw_response<T>(&self, request: Request) -> Result<Response<T>, ClientError>
    where
        T: ReadObject + DeserializeOwned + Send,
    {
        let mut stream = connect(self.addr, self.timeout).await?;
        debug!(addr = %self.addr, %request, contract = %self.contract, "Sending request");

        bounded(self.timeout, async {
            self.contract.write_request(&request, &mut stream).await?;
            let response = self.contract.read_response::<T, _>(&mut stream).await?;
            Ok::<_, ClientError>(response)
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Available,
    NotAvailable,
}

/// Probes the status server.
#[derive(Debug, Clone)]
pub struct ServerAvailabilityProvider {
    addr: SocketAddr,
    timeout: Duration,
}

impl ServerAvailabilityProvider {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Any failure, wrong reply or timeout counts as unavailable.
    pub async fn status(&self) -> ServerStatus {
        match self.probe().await {
            Ok(()) => ServerStatus::Available,
            Err(e) => {
                debug!(addr = %self.addr, error = %e, "Server unavailable");
                ServerStatus::NotAvailable
            }
        }
    }

    async fn probe(&self) -> Result<(), ClientError> {
        let mut stream = connect(self.addr, self.timeout).await?;

        bounded(self.timeout, async {
            stream.write_u8(STATUS_PROBE).await?;
            let reply = stream.read_u8().await?;
            if reply != STATUS_AVAILABLE {
                return Err(ClientError::UnexpectedReply(format!("status byte {reply}")));
            }
            Ok::<_, ClientError>(())
        })
        .await
    }
}

/// Reads the next acquisition time from the channel-info server.
#[derive(Debug, Clone)]
pub struct ChannelInfoClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl ChannelInfoClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Milliseconds until the next acquisition, never negative.
    pub async fn millis_until_next_weather(&self) -> Result<i64, ClientError> {
        let mut stream = connect(self.addr, self.timeout).await?;

        let millis = bounded(self.timeout, async {
            Ok::<_, ClientError>(stream.read_i64_le().await?)
        })
        .await?;
        Ok(millis.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_refused_is_a_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(addr, ContractKind::default(), Duration::from_secs(5));
        let err = client
            .request::<crate::core::WeatherInfo>(Command::GetLastWeather, Argument::None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }), "{err}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let probe = ServerAvailabilityProvider::new(addr, Duration::from_millis(200));
        assert_eq!(probe.status().await, ServerStatus::NotAvailable);
    }

    #[tokio::test]
    async fn wrong_status_byte_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = stream.read_u8().await;
            let _ = stream.write_u8(0).await;
        });

        let probe = ServerAvailabilityProvider::new(addr, Duration::from_secs(5));
        assert!(matches!(
            probe.probe().await,
            Err(ClientError::UnexpectedReply(_))
        ));
    }

    #[tokio::test]
    async fn channel_info_is_clamped_to_zero() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = stream.write_i64_le(-250).await;
        });

        let client = ChannelInfoClient::new(addr, Duration::from_secs(5));
        assert_eq!(client.millis_until_next_weather().await.unwrap(), 0);
    }
}
