//! Wire codecs for [`Request`] and [`Response`].
//!
//! A contract reads and writes one request or one response against a byte
//! stream. Two interchangeable contracts exist:
//!
//! - [`RawContract`]: compact little-endian binary, parameterized over an
//!   [`ArgumentCodec`] (type-tagged or length-prefixed opaque arguments)
//! - [`JsonContract`]: one JSON document per message
//!
//! [`ContractKind`] selects one at runtime from configuration.
//!
//! The wire carries no type tag for `Ok` payloads, so readers name the
//! expected payload type as a type parameter.

mod arguments;
mod json;
mod raw;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::serialization::{ReadObject, SerializationError, ValidationError, WriteObject};

use super::protocol::{ErrorCode, Request, Response};

pub use arguments::{ArgumentCodec, OpaqueArguments, TaggedArguments};
pub use json::{JsonContract, MAX_JSON_MESSAGE_SIZE};
pub use raw::{RESPONSE_BUFFER_SIZE, RawContract};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown response status {0}")]
    UnknownResponseStatus(u8),
    #[error("unknown argument type {0}")]
    UnknownArgumentType(u8),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown command name '{0}'")]
    UnknownCommandName(String),
    #[error("command id {0} has no name")]
    UnknownCommandId(u8),
    #[error("payload of {size} bytes does not fit a 16-bit length prefix")]
    PayloadTooLarge { size: usize },
    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl ProtocolError {
    /// The request frame was read completely but its content is unusable.
    /// The server still answers these with an error response; every other
    /// decode failure drops the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidArgument(_) | ProtocolError::UnknownCommandName(_)
        )
    }

    /// A response failed to encode before any byte reached the stream, so
    /// an error response can still take its place.
    pub fn is_unsent(&self) -> bool {
        matches!(
            self,
            ProtocolError::PayloadTooLarge { .. }
                | ProtocolError::MessageTooLarge { .. }
                | ProtocolError::Serialization(_)
        )
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::Io(_) => ErrorCode::Io,
            ProtocolError::InvalidArgument(_) | ProtocolError::Validation(_) => {
                ErrorCode::InvalidArguments
            }
            ProtocolError::UnknownCommandName(_) | ProtocolError::UnknownCommandId(_) => {
                ErrorCode::InvalidCommand
            }
            ProtocolError::UnknownResponseStatus(_) => ErrorCode::InvalidResponse,
            _ => ErrorCode::Unknown,
        }
    }
}

/// Codec for one request and one response per connection.
#[async_trait]
pub trait Contract: Send + Sync {
    async fn write_request<W>(&self, request: &Request, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send;

    async fn read_request<R>(&self, reader: &mut R) -> Result<Request, ProtocolError>
    where
        R: AsyncRead + Unpin + Send;

    async fn write_response<T, W>(
        &self,
        response: &Response<T>,
        writer: &mut W,
    ) -> Result<(), ProtocolError>
    where
        T: WriteObject + Serialize + Sync,
        W: AsyncWrite + Unpin + Send;

    async fn read_response<T, R>(&self, reader: &mut R) -> Result<Response<T>, ProtocolError>
    where
        T: ReadObject + DeserializeOwned + Send,
        R: AsyncRead + Unpin + Send;
}

/// How the raw contract encodes request arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentEncoding {
    /// Type byte followed by 0, 4 or 8 bytes.
    #[default]
    Tagged,
    /// 16-bit length followed by an opaque blob.
    Opaque,
}

/// Contract chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Raw(ArgumentEncoding),
    Json,
}

impl Default for ContractKind {
    fn default() -> Self {
        ContractKind::Raw(ArgumentEncoding::Tagged)
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Raw(ArgumentEncoding::Tagged) => f.write_str("raw/tagged"),
            ContractKind::Raw(ArgumentEncoding::Opaque) => f.write_str("raw/opaque"),
            ContractKind::Json => f.write_str("json"),
        }
    }
}

const TAGGED: RawContract<TaggedArguments> = RawContract::new();
const OPAQUE: RawContract<OpaqueArguments> = RawContract::new();

#[async_trait]
impl Contract for ContractKind {
    async fn write_request<W>(&self, request: &Request, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            ContractKind::Raw(ArgumentEncoding::Tagged) => TAGGED.write_request(request, writer).await,
            ContractKind::Raw(ArgumentEncoding::Opaque) => OPAQUE.write_request(request, writer).await,
            ContractKind::Json => JsonContract.write_request(request, writer).await,
        }
    }

    async fn read_request<R>(&self, reader: &mut R) -> Result<Request, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self {
            ContractKind::Raw(ArgumentEncoding::Tagged) => TAGGED.read_request(reader).await,
            ContractKind::Raw(ArgumentEncoding::Opaque) => OPAQUE.read_request(reader).await,
            ContractKind::Json => JsonContract.read_request(reader).await,
        }
    }

    async fn write_response<T, W>(
        &self,
        response: &Response<T>,
        writer: &mut W,
    ) -> Result<(), ProtocolError>
    where
        T: WriteObject + Serialize + Sync,
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            ContractKind::Raw(ArgumentEncoding::Tagged) => {
                TAGGED.write_response(response, writer).await
            }
            ContractKind::Raw(ArgumentEncoding::Opaque) => {
                OPAQUE.write_response(response, writer).await
            }
            ContractKind::Json => JsonContract.write_response(response, writer).await,
        }
    }

    async fn read_response<T, R>(&self, reader: &mut R) -> Result<Response<T>, ProtocolError>
    where
        T: ReadObject + DeserializeOwned + Send,
        R: AsyncRead + Unpin + Send,
    {
        match self {
            ContractKind::Raw(ArgumentEncoding::Tagged) => TAGGED.read_response(reader).await,
            ContractKind::Raw(ArgumentEncoding::Opaque) => OPAQUE.read_response(reader).await,
            ContractKind::Json => JsonContract.read_response(reader).await,
        }
    }
}
