//! Compact binary contract. All integers are little-endian.
//!
//! ```text
//! request:  byte command | argument (see ArgumentCodec)
//! response: byte status  | status 0: nothing
//!                        | status 1: int32 error code
//!                        | status 2: int16 size | size bytes of payload
//! ```

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::protocol::{ErrorCode, Request, Response};
use crate::serialization::{
    ReadObject, ValidationError, ValueWriter, WriteObject, bytes, of_byte_array, to_byte_array,
};

use super::arguments::ArgumentCodec;
use super::{Contract, ProtocolError};

/// Largest single read while receiving an `Ok` payload.
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

const STATUS_EMPTY: u8 = 0;
const STATUS_ERROR: u8 = 1;
const STATUS_OK: u8 = 2;

pub struct RawContract<A> {
    arguments: PhantomData<fn() -> A>,
}

impl<A: ArgumentCodec> RawContract<A> {
    pub const fn new() -> Self {
        Self {
            arguments: PhantomData,
        }
    }
}

impl<A: ArgumentCodec> Default for RawContract<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: ArgumentCodec> Contract for RawContract<A> {
    async fn write_request<W>(&self, request: &Request, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut frame = vec![0u8; 1 + A::encoded_len(&request.argument)];
        let mut frame_writer = ValueWriter::new(&mut frame);
        frame_writer.int8(request.command as i8);
        A::encode(&request.argument, &mut frame_writer);

        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_request<R>(&self, reader: &mut R) -> Result<Request, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let command = reader.read_u8().await?;

        let mut header = vec![0u8; A::HEADER_LEN];
        reader.read_exact(&mut header).await?;

        let mut payload = vec![0u8; A::payload_len(&header)?];
        reader.read_exact(&mut payload).await?;

        let argument = A::decode(&header, &payload)?;
        Ok(Request { command, argument })
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
        match response {
            Response::Empty => writer.write_all(&[STATUS_EMPTY]).await?,
            Response::Error(code) => {
                let mut frame = [0u8; 5];
                frame[0] = STATUS_ERROR;
                bytes::write_i32(&mut frame, 1, code.id());
                writer.write_all(&frame).await?;
            }
            Response::Ok(value) => {
                let payload = to_byte_array(value)?;
                let size = i16::try_from(payload.len()).map_err(|_| {
                    ProtocolError::PayloadTooLarge {
                        size: payload.len(),
                    }
                })?;

                let mut header = [0u8; 3];
                header[0] = STATUS_OK;
                bytes::write_i16(&mut header, 1, size);
                writer.write_all(&header).await?;
                writer.write_all(&payload).await?;
            }
        }
        writer.flush().await?;
        Ok(())
    }

    async fn read_response<T, R>(&self, reader: &mut R) -> Result<Response<T>, ProtocolError>
    where
        T: ReadObject + DeserializeOwned + Send,
        R: AsyncRead + Unpin + Send,
    {
        match reader.read_u8().await? {
            STATUS_EMPTY => Ok(Response::Empty),
            STATUS_ERROR => {
                let code = reader.read_i32_le().await?;
                Ok(Response::Error(ErrorCode::from_id(code)))
            }
            STATUS_OK => {
                let size = reader.read_i16_le().await?;
                if size < 0 {
                    return Err(ValidationError::invalid_value("payload size", size).into());
                }

                let mut payload = vec![0u8; size as usize];
                for chunk in payload.chunks_mut(RESPONSE_BUFFER_SIZE) {
                    reader.read_exact(chunk).await?;
                }
                Ok(Response::Ok(of_byte_array(&payload)?))
            }
            other => Err(ProtocolError::UnknownResponseStatus(other)),
        }
    }
}
