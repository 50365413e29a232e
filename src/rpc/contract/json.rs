//! Human-readable contract: one JSON object per message, no length prefix.
//!
//! Requests look like `{"command":"GET_DAY_REPORT","argClass":"Integer","arg":132449548}`
//! with `argClass`/`arg` omitted when there is no argument. Responses are
//! `{}` for empty, `{"error":"INVALID_ARGUMENTS"}` for errors, and the
//! payload object itself otherwise.
//!
//! The reader pulls the stream in small chunks and stops as soon as the
//! buffered bytes form a complete document, so messages must be objects
//! and never larger than [`MAX_JSON_MESSAGE_SIZE`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::protocol::{Argument, Command, ErrorCode, Request, Response};
use crate::serialization::{ReadObject, ValidationError, WriteObject};

use super::{Contract, ProtocolError};

/// Upper bound for one message in either direction. A thinned day report
/// is under 150 KiB and a range report spanning years stays below this.
pub const MAX_JSON_MESSAGE_SIZE: usize = 1024 * 1024;

const READ_CHUNK_SIZE: usize = 1024;

const INTEGER_CLASS: &str = "Integer";
const DATE_RANGE_CLASS: &str = "DateRange";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContract;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRequest {
    command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arg_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arg: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonDateRange {
    start: i32,
    end_inclusive: i32,
}

impl JsonRequest {
    fn from_request(request: &Request) -> Result<Self, ProtocolError> {
        let command = request
            .command()
            .ok_or(ProtocolError::UnknownCommandId(request.command))?;

        let (arg_class, arg) = match request.argument {
            Argument::None => (None, None),
            Argument::Integer(value) => (Some(INTEGER_CLASS), Some(json!(value))),
            Argument::DateRange {
                start,
                end_inclusive,
            } => (
                Some(DATE_RANGE_CLASS),
                Some(serde_json::to_value(JsonDateRange {
                    start,
                    end_inclusive,
                })?),
            ),
        };

        Ok(Self {
            command: command.name().to_string(),
            arg_class: arg_class.map(str::to_string),
            arg,
        })
    }

    fn into_request(self) -> Result<Request, ProtocolError> {
        let command = Command::from_name(&self.command)?;

        let argument = match (self.arg_class.as_deref(), self.arg) {
            (None, None) => Argument::None,
            (Some(INTEGER_CLASS), Some(arg)) => {
                Argument::Integer(serde_json::from_value(arg).map_err(invalid_argument)?)
            }
            (Some(DATE_RANGE_CLASS), Some(arg)) => {
                let range: JsonDateRange =
                    serde_json::from_value(arg).map_err(invalid_argument)?;
                Argument::DateRange {
                    start: range.start,
                    end_inclusive: range.end_inclusive,
                }
            }
            (Some(class), Some(_)) => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "unknown argument class '{class}'"
                )));
            }
            (class, arg) => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "argClass present: {}, arg present: {}",
                    class.is_some(),
                    arg.is_some()
                )));
            }
        };

        Ok(Request {
            command: command.id(),
            argument,
        })
    }
}

fn invalid_argument(e: serde_json::Error) -> ProtocolError {
    ProtocolError::InvalidArgument(e.to_string())
}

async fn write_message<W>(writer: &mut W, message: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + Send,
{
    if message.len() > MAX_JSON_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            limit: MAX_JSON_MESSAGE_SIZE,
        });
    }
    writer.write_all(message).await?;
    writer.flush().await?;
    Ok(())
}

/// Read until the buffered bytes parse as one JSON object.
async fn read_object<R>(reader: &mut R) -> Result<Map<String, Value>, ProtocolError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut message = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        message.extend_from_slice(&chunk[..n]);
        if message.len() > MAX_JSON_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                limit: MAX_JSON_MESSAGE_SIZE,
            });
        }
        // Whitespace cannot complete a document.
        if chunk[..n].iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<Value>(&message) {
            Ok(Value::Object(object)) => return Ok(object),
            Ok(other) => {
                return Err(ValidationError::InvalidContent(format!(
                    "expected a JSON object, got {other}"
                ))
                .into());
            }
            Err(e) if e.is_eof() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[async_trait]
impl Contract for JsonContract {
    async fn write_request<W>(&self, request: &Request, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let message = serde_json::to_vec(&JsonRequest::from_request(request)?)?;
        write_message(writer, &message).await
    }

    async fn read_request<R>(&self, reader: &mut R) -> Result<Request, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let object = read_object(reader).await?;
        let request: JsonRequest = serde_json::from_value(Value::Object(object))?;
        request.into_request()
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
        let message = match response {
            Response::Empty => b"{}".to_vec(),
            Response::Error(code) => serde_json::to_vec(&json!({ "error": code.name() }))?,
            Response::Ok(value) => serde_json::to_vec(value)?,
        };
        write_message(writer, &message).await
    }

    async fn read_response<T, R>(&self, reader: &mut R) -> Result<Response<T>, ProtocolError>
    where
        T: ReadObject + DeserializeOwned + Send,
        R: AsyncRead + Unpin + Send,
    {
        let object = read_object(reader).await?;
        if object.is_empty() {
            return Ok(Response::Empty);
        }

        if let Some(error) = object.get("error") {
            let name = error.as_str().ok_or_else(|| {
                ValidationError::InvalidContent(format!("error name must be a string, got {error}"))
            })?;
            return Ok(Response::Error(ErrorCode::from_name(name)));
        }

        Ok(Response::Ok(serde_json::from_value(Value::Object(object))?))
    }
}
