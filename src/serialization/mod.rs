//! Value serialization framework for the compact binary wire format.
//!
//! A type becomes serializable by implementing [`WriteObject`] (exact size
//! plus write) and [`ReadObject`] (read back). The pair is the serializer
//! triple: the size is computed up front so buffers are allocated once and
//! payloads can be length-prefixed without probing.
//!
//! Registration is the trait impl itself, so asking for the serializer of
//! a type that has none is a compile error rather than a runtime failure.
//! The one contract the compiler cannot check, that `write_object` emits
//! exactly `serialized_size` bytes, is verified by [`to_byte_array`].

pub mod bytes;

use thiserror::Error;

/// A decoded value violates a domain invariant or its buffer ended early.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEnd { needed: usize, available: usize },
    #[error("invalid '{name}': {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid content: {0}")]
    InvalidContent(String),
}

impl ValidationError {
    pub fn invalid_value(name: &'static str, value: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SerializationError {
    /// The serializer broke its own size contract. This is a programming
    /// error in a `WriteObject` impl, never caused by input.
    #[error("serializer for {type_name} declared {declared} bytes but wrote {written}")]
    SizeMismatch {
        type_name: &'static str,
        declared: usize,
        written: usize,
    },
    /// A collection is longer than its `int16` length prefix can express.
    #[error("{name} has {len} elements, more than the {max} an int16 prefix holds", max = i16::MAX)]
    LengthOverflow { name: &'static str, len: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Size and write half of a serializer.
pub trait WriteObject {
    /// Exact number of bytes `write_object` will emit for this value.
    fn serialized_size(&self) -> usize;

    fn write_object(&self, writer: &mut ValueWriter<'_>);
}

/// Read half of a serializer.
pub trait ReadObject: Sized {
    fn read_object(reader: &mut ValueReader<'_>) -> Result<Self, ValidationError>;
}

/// Cursor writing primitives into a pre-sized buffer.
pub struct ValueWriter<'a> {
    data: &'a mut [u8],
    position: usize,
    overflow: Option<(&'static str, usize)>,
}

impl<'a> ValueWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Start writing at `offset`.
    ///
    /// # Panics
    ///
    /// If `offset` is past the end of `data`.
    pub fn at(data: &'a mut [u8], offset: usize) -> Self {
        assert!(offset <= data.len(), "offset {offset} out of bounds");
        Self {
            data,
            position: offset,
            overflow: None,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn int8(&mut self, value: i8) {
        self.data[self.position] = value as u8;
        self.position += 1;
    }

    pub fn int16(&mut self, value: i16) {
        bytes::write_i16(self.data, self.position, value);
        self.position += 2;
    }

    /// Write the element count of `name` as an `int16`. A count that does
    /// not fit is written as 0 and recorded; [`to_byte_array`] rejects it.
    pub fn length16(&mut self, name: &'static str, len: usize) {
        match i16::try_from(len) {
            Ok(len) => self.int16(len),
            Err(_) => {
                self.overflow.get_or_insert((name, len));
                self.int16(0);
            }
        }
    }

    /// First length passed to [`length16`](Self::length16) that did not fit.
    pub fn overflow(&self) -> Option<(&'static str, usize)> {
        self.overflow
    }

    pub fn int32(&mut self, value: i32) {
        bytes::write_i32(self.data, self.position, value);
        self.position += 4;
    }

    pub fn int64(&mut self, value: i64) {
        bytes::write_i64(self.data, self.position, value);
        self.position += 8;
    }

    pub fn float32(&mut self, value: f32) {
        bytes::write_f32(self.data, self.position, value);
        self.position += 4;
    }

    pub fn bytes(&mut self, value: &[u8]) {
        self.data[self.position..self.position + value.len()].copy_from_slice(value);
        self.position += value.len();
    }
}

/// Cursor reading primitives out of a received buffer.
///
/// Unlike the writer, the reader checks bounds: its input comes from the
/// network and a short payload must fail as a `ValidationError`.
pub struct ValueReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ValueReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.position == self.data.len()
    }

    fn take(&mut self, width: usize) -> Result<usize, ValidationError> {
        if self.remaining() < width {
            return Err(ValidationError::UnexpectedEnd {
                needed: width,
                available: self.remaining(),
            });
        }
        let offset = self.position;
        self.position += width;
        Ok(offset)
    }

    pub fn int8(&mut self) -> Result<i8, ValidationError> {
        let offset = self.take(1)?;
        Ok(self.data[offset] as i8)
    }

    pub fn int16(&mut self) -> Result<i16, ValidationError> {
        let offset = self.take(2)?;
        Ok(bytes::read_i16(self.data, offset))
    }

    pub fn int32(&mut self) -> Result<i32, ValidationError> {
        let offset = self.take(4)?;
        Ok(bytes::read_i32(self.data, offset))
    }

    pub fn int64(&mut self) -> Result<i64, ValidationError> {
        let offset = self.take(8)?;
        Ok(bytes::read_i64(self.data, offset))
    }

    pub fn float32(&mut self) -> Result<f32, ValidationError> {
        let offset = self.take(4)?;
        Ok(bytes::read_f32(self.data, offset))
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], ValidationError> {
        let offset = self.take(len)?;
        Ok(&self.data[offset..offset + len])
    }
}

/// Serialize `value` into a buffer of exactly `serialized_size` bytes.
pub fn to_byte_array<T: WriteObject + ?Sized>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let declared = value.serialized_size();
    let mut buffer = vec![0u8; declared];
    let mut writer = ValueWriter::new(&mut buffer);
    value.write_object(&mut writer);

    if let Some((name, len)) = writer.overflow() {
        return Err(SerializationError::LengthOverflow { name, len });
    }
    let written = writer.position();
    if written != declared {
        return Err(SerializationError::SizeMismatch {
            type_name: std::any::type_name::<T>(),
            declared,
            written,
        });
    }
    Ok(buffer)
}

/// Read a value that must occupy the whole of `data`.
pub fn of_byte_array<T: ReadObject>(data: &[u8]) -> Result<T, ValidationError> {
    let mut reader = ValueReader::new(data);
    let value = T::read_object(&mut reader)?;
    if !reader.is_at_end() {
        return Err(ValidationError::InvalidContent(format!(
            "{} trailing bytes after {}",
            reader.remaining(),
            std::any::type_name::<T>()
        )));
    }
    Ok(value)
}
