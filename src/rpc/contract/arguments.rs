//! Argument encodings for the raw contract.
//!
//! A request frame is `command byte | header | payload`. The codec owns
//! the header, says how many payload bytes follow it, and turns both back
//! into an [`Argument`].

use crate::serialization::{ValidationError, ValueReader, ValueWriter, bytes};

use super::ProtocolError;
use crate::rpc::protocol::Argument;

pub trait ArgumentCodec: Send + Sync + 'static {
    const HEADER_LEN: usize;

    /// Header plus payload length for `argument`.
    fn encoded_len(argument: &Argument) -> usize;

    fn encode(argument: &Argument, writer: &mut ValueWriter<'_>);

    /// Payload length announced by a received header.
    fn payload_len(header: &[u8]) -> Result<usize, ProtocolError>;

    fn decode(header: &[u8], payload: &[u8]) -> Result<Argument, ProtocolError>;
}

const NONE_TYPE: u8 = 0;
const INTEGER_TYPE: u8 = 1;
const DATE_RANGE_TYPE: u8 = 2;

fn payload_size(argument: &Argument) -> usize {
    match argument {
        Argument::None => 0,
        Argument::Integer(_) => 4,
        Argument::DateRange { .. } => 8,
    }
}

fn write_payload(argument: &Argument, writer: &mut ValueWriter<'_>) {
    match *argument {
        Argument::None => {}
        Argument::Integer(value) => writer.int32(value),
        Argument::DateRange {
            start,
            end_inclusive,
        } => {
            writer.int32(start);
            writer.int32(end_inclusive);
        }
    }
}

/// `byte argType` (0 none, 1 integer, 2 date range) then 0, 4 or 8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedArguments;

impl ArgumentCodec for TaggedArguments {
    const HEADER_LEN: usize = 1;

    fn encoded_len(argument: &Argument) -> usize {
        Self::HEADER_LEN + payload_size(argument)
    }

    fn encode(argument: &Argument, writer: &mut ValueWriter<'_>) {
        let tag = match argument {
            Argument::None => NONE_TYPE,
            Argument::Integer(_) => INTEGER_TYPE,
            Argument::DateRange { .. } => DATE_RANGE_TYPE,
        };
        writer.int8(tag as i8);
        write_payload(argument, writer);
    }

    fn payload_len(header: &[u8]) -> Result<usize, ProtocolError> {
        match header[0] {
            NONE_TYPE => Ok(0),
            INTEGER_TYPE => Ok(4),
            DATE_RANGE_TYPE => Ok(8),
            other => Err(ProtocolError::UnknownArgumentType(other)),
        }
    }

    fn decode(header: &[u8], payload: &[u8]) -> Result<Argument, ProtocolError> {
        let mut reader = ValueReader::new(payload);
        let argument = match header[0] {
            NONE_TYPE => Argument::None,
            INTEGER_TYPE => Argument::Integer(reader.int32()?),
            DATE_RANGE_TYPE => Argument::DateRange {
                start: reader.int32()?,
                end_inclusive: reader.int32()?,
            },
            other => return Err(ProtocolError::UnknownArgumentType(other)),
        };
        Ok(argument)
    }
}

/// `int16 length` then an opaque blob, interpreted by its length:
/// 0 is no argument, 4 a packed date, 8 a pair of packed dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueArguments;

impl ArgumentCodec for OpaqueArguments {
    const HEADER_LEN: usize = 2;

    fn encoded_len(argument: &Argument) -> usize {
        Self::HEADER_LEN + payload_size(argument)
    }

    fn encode(argument: &Argument, writer: &mut ValueWriter<'_>) {
        writer.int16(payload_size(argument) as i16);
        write_payload(argument, writer);
    }

    fn payload_len(header: &[u8]) -> Result<usize, ProtocolError> {
        let len = bytes::read_i16(header, 0);
        if len < 0 {
            return Err(ValidationError::invalid_value("argument length", len).into());
        }
        Ok(len as usize)
    }

    fn decode(_header: &[u8], payload: &[u8]) -> Result<Argument, ProtocolError> {
        let mut reader = ValueReader::new(payload);
        let argument = match payload.len() {
            0 => Argument::None,
            4 => Argument::Integer(reader.int32()?),
            8 => Argument::DateRange {
                start: reader.int32()?,
                end_inclusive: reader.int32()?,
            },
            other => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "argument of {other} bytes is neither a date nor a date range"
                )));
            }
        };
        Ok(argument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<A: ArgumentCodec>(argument: &Argument) -> Vec<u8> {
        let mut buf = vec![0u8; A::encoded_len(argument)];
        A::encode(argument, &mut ValueWriter::new(&mut buf));
        buf
    }

    #[test]
    fn tagged_layout() {
        assert_eq!(encode::<TaggedArguments>(&Argument::None), [0]);
        assert_eq!(
            encode::<TaggedArguments>(&Argument::Integer(0x0102_0304)),
            [1, 4, 3, 2, 1]
        );
        assert_eq!(
            encode::<TaggedArguments>(&Argument::DateRange {
                start: 1,
                end_inclusive: 2
            }),
            [2, 1, 0, 0, 0, 2, 0, 0, 0]
        );
    }

    #[test]
    fn tagged_rejects_unknown_type() {
        assert!(matches!(
            TaggedArguments::payload_len(&[7]),
            Err(ProtocolError::UnknownArgumentType(7))
        ));
    }

    #[test]
    fn opaque_layout() {
        assert_eq!(encode::<OpaqueArguments>(&Argument::None), [0, 0]);
        assert_eq!(
            encode::<OpaqueArguments>(&Argument::Integer(-1)),
            [4, 0, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(OpaqueArguments::payload_len(&[8, 0]).unwrap(), 8);
    }

    #[test]
    fn opaque_interprets_by_length() {
        let range = OpaqueArguments::decode(&[8, 0], &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
        assert_eq!(
            range,
            Argument::DateRange {
                start: 1,
                end_inclusive: 2
            }
        );

        let err = OpaqueArguments::decode(&[1, 0], &[1]).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn opaque_rejects_negative_length() {
        let err = OpaqueArguments::payload_len(&(-4i16).to_le_bytes()).unwrap_err();
        assert!(!err.is_recoverable());
    }
}
