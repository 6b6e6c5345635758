use chrono::{Datelike, NaiveDate};

use crate::{config::CodecConfig, data::CodecError, schema::DataType};

/// A single native value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    VarChar(String),
    Date(NaiveDate),
    Null,
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::SmallInt(_) => "smallint",
            Cell::Integer(_) => "integer",
            Cell::BigInt(_) => "bigint",
            Cell::Double(_) => "double precision",
            Cell::VarChar(_) => "character varying",
            Cell::Date(_) => "date",
            Cell::Null => "null",
        }
    }
}

impl From<i16> for Cell {
    fn from(value: i16) -> Self {
        Cell::SmallInt(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Integer(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::BigInt(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Double(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::VarChar(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::VarChar(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Encodes and decodes single values in their binary wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCodec {
    max_varchar_len: u32,
}

impl TypeCodec {
    // 2000-01-01 counted in days from 0001-01-01 (day 1)
    const DATE_EPOCH_DAYS_FROM_CE: i32 = 730_120;
    const VARCHAR_LENGTH_SIZE: usize = 4;

    pub fn new(config: &CodecConfig) -> Self {
        Self {
            max_varchar_len: *config.max_varchar_len(),
        }
    }

    pub fn max_varchar_len(&self) -> u32 {
        self.max_varchar_len
    }

    pub fn encode(&self, cell: &Cell, data_type: DataType) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(data_type.min_width());
        self.encode_into(cell, data_type, &mut buf)?;
        Ok(buf)
    }

    // Nothing is appended to buf when an error is returned
    pub fn encode_into(&self, cell: &Cell, data_type: DataType, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        match (data_type, cell) {
            (DataType::SmallInt, _) => {
                let value = narrow::<i16>(integer_value(cell, data_type)?, data_type)?;
                buf.extend_from_slice(&value.to_be_bytes());
            }
            (DataType::Integer, _) => {
                let value = narrow::<i32>(integer_value(cell, data_type)?, data_type)?;
                buf.extend_from_slice(&value.to_be_bytes());
            }
            (DataType::BigInt, _) => {
                let value = integer_value(cell, data_type)?;
                buf.extend_from_slice(&value.to_be_bytes());
            }
            (DataType::DoublePrecision, Cell::Double(value)) => {
                buf.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            (DataType::VarChar, Cell::VarChar(text)) => {
                let bytes = text.as_bytes();
                let length = u32::try_from(bytes.len())
                    .ok()
                    .filter(|len| *len <= self.max_varchar_len)
                    .ok_or(CodecError::InvalidLength {
                        length: bytes.len() as u64,
                        max: self.max_varchar_len as u64,
                    })?;
                buf.extend_from_slice(&length.to_be_bytes());
                buf.extend_from_slice(bytes);
            }
            (DataType::Date, Cell::Date(date)) => {
                let offset = date.num_days_from_ce() as i64 - Self::DATE_EPOCH_DAYS_FROM_CE as i64;
                let days = i32::try_from(offset).map_err(|_| CodecError::Range {
                    data_type,
                    value: date.to_string(),
                })?;
                buf.extend_from_slice(&days.to_be_bytes());
            }
            (_, other) => {
                return Err(CodecError::TypeMismatch {
                    data_type,
                    actual: other.kind_name(),
                });
            }
        }

        Ok(())
    }

    /// Decodes the value at the start of `bytes`.
    /// Returns: (Cell, number of bytes read)
    pub fn decode(&self, bytes: &[u8], data_type: DataType) -> Result<(Cell, usize), CodecError> {
        match data_type {
            DataType::SmallInt => {
                let value = i16::from_be_bytes(read_array(bytes)?);
                Ok((Cell::SmallInt(value), 2))
            }
            DataType::Integer => {
                let value = i32::from_be_bytes(read_array(bytes)?);
                Ok((Cell::Integer(value), 4))
            }
            DataType::BigInt => {
                let value = i64::from_be_bytes(read_array(bytes)?);
                Ok((Cell::BigInt(value), 8))
            }
            DataType::DoublePrecision => {
                let bits = u64::from_be_bytes(read_array(bytes)?);
                Ok((Cell::Double(f64::from_bits(bits)), 8))
            }
            DataType::VarChar => {
                let length = u32::from_be_bytes(read_array(bytes)?);
                // checked before touching the payload, a corrupt length must not drive allocation
                if length > self.max_varchar_len {
                    return Err(CodecError::InvalidLength {
                        length: length as u64,
                        max: self.max_varchar_len as u64,
                    });
                }

                let end = usize::try_from(length)
                    .ok()
                    .and_then(|len| len.checked_add(Self::VARCHAR_LENGTH_SIZE))
                    .ok_or(CodecError::InvalidLength {
                        length: length as u64,
                        max: self.max_varchar_len as u64,
                    })?;
                let payload = bytes
                    .get(Self::VARCHAR_LENGTH_SIZE..end)
                    .ok_or(CodecError::TruncatedInput {
                        needed: end,
                        available: bytes.len(),
                    })?;
                let text = std::str::from_utf8(payload).map_err(|e| CodecError::Encoding(e.to_string()))?;

                Ok((Cell::VarChar(text.to_string()), end))
            }
            DataType::Date => {
                let days = i32::from_be_bytes(read_array(bytes)?);
                let date = days
                    .checked_add(Self::DATE_EPOCH_DAYS_FROM_CE)
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or(CodecError::Range {
                        data_type,
                        value: days.to_string(),
                    })?;
                Ok((Cell::Date(date), 4))
            }
        }
    }
}

impl Default for TypeCodec {
    fn default() -> Self {
        Self::new(&CodecConfig::default())
    }
}

fn integer_value(cell: &Cell, data_type: DataType) -> Result<i64, CodecError> {
    match cell {
        Cell::SmallInt(v) => Ok(*v as i64),
        Cell::Integer(v) => Ok(*v as i64),
        Cell::BigInt(v) => Ok(*v),
        other => Err(CodecError::TypeMismatch {
            data_type,
            actual: other.kind_name(),
        }),
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, data_type: DataType) -> Result<T, CodecError> {
    T::try_from(value).map_err(|_| CodecError::Range {
        data_type,
        value: value.to_string(),
    })
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(CodecError::TruncatedInput {
            needed: N,
            available: bytes.len(),
        })
}
