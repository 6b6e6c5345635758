pub mod cell;
pub mod record;

use thiserror::Error;

use crate::schema::DataType;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("CodecError - value {value} is out of range for {data_type}")]
    Range { data_type: DataType, value: String },
    #[error("CodecError - text is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("CodecError - truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput { needed: usize, available: usize },
    #[error("CodecError - declared length {length} exceeds maximum of {max}")]
    InvalidLength { length: u64, max: u64 },
    #[error("CodecError - record has {actual} values but schema has {expected} columns")]
    Arity { expected: usize, actual: usize },
    #[error("CodecError - record does not align with schema: {0}")]
    SchemaMismatch(String),
    #[error("CodecError - type mismatch for {data_type}: got {actual}")]
    TypeMismatch { data_type: DataType, actual: &'static str },
    #[error("CodecError - null in non-nullable column '{0}'")]
    UnexpectedNull(String),
    #[error("CodecError - invalid presence flag {0:#04x}")]
    InvalidPresenceFlag(u8),
}
