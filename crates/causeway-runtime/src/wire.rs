//! Wire codec - binary encoding for boundary crossings
//!
//! Every value that crosses the boundary travels as a byte buffer in a fixed
//! format both sides agree on:
//! - primitives are big-endian, fixed width
//! - strings and sequences carry a 4-byte signed length prefix
//! - options are a 1-byte tag (0 absent, 1 present) followed by the value
//! - enums are an `i32` variant index
//! - records are strict field-order compositions of the above
//!
//! Field order *is* the contract: both sides must write and read the exact
//! same sequence of primitive operations. A top-level decode that leaves
//! bytes unread means the two sides disagree about the schema, which is an
//! integrity defect rather than a recoverable error.

use thiserror::Error;

/// Codec error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Read past the end of the buffer
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },

    /// Bytes left over after a top-level decode (schema mismatch)
    #[error("{trailing} trailing bytes after top-level decode")]
    TrailingBytes { trailing: usize },

    /// Length does not fit the 4-byte signed prefix
    #[error("length {len} exceeds the 4-byte signed length prefix")]
    LengthOverflow { len: usize },

    /// Negative length prefix on the wire
    #[error("negative length prefix: {len}")]
    NegativeLength { len: i32 },

    /// Boolean byte other than 0 or 1
    #[error("invalid boolean byte {byte:#04x}")]
    InvalidBool { byte: u8 },

    /// Option tag other than 0 or 1
    #[error("invalid option tag {tag:#04x}")]
    InvalidOptionTag { tag: u8 },

    /// Enum variant index with no corresponding variant
    #[error("invalid enum variant index {index}")]
    InvalidEnumIndex { index: i32 },

    /// String bytes are not valid UTF-8
    #[error("invalid utf-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Typed-error payload arrived for an operation that declares no error
    #[error("typed error payload on an operation that declares none")]
    UndeclaredError,
}

/// Types that can be written to the wire
pub trait Encode {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError>;
}

/// Types that can be read back from the wire
pub trait Decode: Sized {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError>;
}

/// Append-only big-endian writer
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consume the writer, yielding the encoded bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Write a length prefix, failing if it does not fit in `i32`
    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = i32::try_from(len).map_err(|_| CodecError::LengthOverflow { len })?;
        self.write_i32(len);
        Ok(())
    }

    /// Write a length-prefixed string
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Write a length-prefixed byte sequence
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Write an enum variant index
    pub fn write_enum_index(&mut self, index: i32) {
        self.write_i32(index);
    }
}

/// Cursor over wire bytes, consuming exactly what the matching writes produced
#[derive(Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Fail unless the reader consumed the stream fully
    ///
    /// Called after every top-level decode; leftover bytes mean the two
    /// sides disagree about the schema.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            trailing => Err(CodecError::TrailingBytes { trailing }),
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::Underflow {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(CodecError::InvalidBool { byte }),
        }
    }

    /// Read a length prefix, rejecting negative values
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength { len })
    }

    /// Read a length-prefixed string
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Read a length-prefixed byte sequence
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Read an enum variant index
    pub fn read_enum_index(&mut self) -> Result<i32, CodecError> {
        self.read_i32()
    }
}

macro_rules! primitive_codec {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
                writer.$write(*self);
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
                reader.$read()
            }
        }
    };
}

primitive_codec!(u8, write_u8, read_u8);
primitive_codec!(i8, write_i8, read_i8);
primitive_codec!(u16, write_u16, read_u16);
primitive_codec!(i16, write_i16, read_i16);
primitive_codec!(u32, write_u32, read_u32);
primitive_codec!(i32, write_i32, read_i32);
primitive_codec!(u64, write_u64, read_u64);
primitive_codec!(i64, write_i64, read_i64);
primitive_codec!(f32, write_f32, read_f32);
primitive_codec!(f64, write_f64, read_f64);
primitive_codec!(bool, write_bool, read_bool);

// Void values occupy no bytes on the wire
impl Encode for () {
    fn encode(&self, _writer: &mut WireWriter) -> Result<(), CodecError> {
        Ok(())
    }
}

impl Decode for () {
    fn decode(_reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(())
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.write_string(self)
    }
}

impl Decode for String {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        reader.read_string()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        match self {
            None => {
                writer.write_u8(0);
                Ok(())
            }
            Some(value) => {
                writer.write_u8(1);
                value.encode(writer)
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(reader)?)),
            tag => Err(CodecError::InvalidOptionTag { tag }),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.write_len(self.len())?;
        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let len = reader.read_len()?;
        // Capacity bounded by what the stream can actually hold
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

/// Encode a value into a fresh byte vector
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut writer = WireWriter::new();
    value.encode(&mut writer)?;
    Ok(writer.into_vec())
}

/// Decode a value from a byte slice, requiring full consumption
pub fn decode_from_slice<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut reader = WireReader::new(bytes);
    let value = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(value)
}
