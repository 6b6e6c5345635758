use crate::{
    config::CodecConfig,
    data::{
        CodecError,
        cell::{Cell, TypeCodec},
    },
    schema::{DataType, Schema},
};

/// One row of values, positionally aligned with the schema columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    cells: Vec<Cell>,
}

impl Record {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl From<Vec<Cell>> for Record {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

const PRESENCE_NULL: u8 = 0;
const PRESENCE_VALUE: u8 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder {
    codec: TypeCodec,
}

impl RecordEncoder {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            codec: TypeCodec::new(config),
        }
    }

    pub fn encode(&self, record: &Record, schema: &Schema) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(schema.min_width_from(0));
        self.encode_into(record, schema, &mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded record to `buf`; on error `buf` is left as it was.
    pub fn encode_into(&self, record: &Record, schema: &Schema, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        if record.len() != schema.len() {
            return Err(CodecError::Arity {
                expected: schema.len(),
                actual: record.len(),
            });
        }

        let start = buf.len();
        let result = record
            .cells()
            .iter()
            .zip(schema.columns().iter())
            .try_for_each(|(cell, column)| {
                if *column.nullable() {
                    if cell.is_null() {
                        buf.push(PRESENCE_NULL);
                        return Ok(());
                    }
                    buf.push(PRESENCE_VALUE);
                } else if cell.is_null() {
                    return Err(CodecError::UnexpectedNull(column.name().clone()));
                }
                self.codec.encode_into(cell, *column.data_type(), buf)
            });

        if result.is_err() {
            buf.truncate(start);
        }
        result
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecoder {
    codec: TypeCodec,
}

impl RecordDecoder {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            codec: TypeCodec::new(config),
        }
    }

    /// Decodes the record at the start of `bytes`.
    /// Returns: (Record, number of bytes read) so back-to-back records can be walked.
    pub fn decode(&self, bytes: &[u8], schema: &Schema) -> Result<(Record, usize), CodecError> {
        self.decode_fields(bytes, schema, false)
    }

    /// Decodes a record that must occupy exactly `bytes`, e.g. a stream frame.
    pub fn decode_framed(&self, bytes: &[u8], schema: &Schema) -> Result<Record, CodecError> {
        let minimum = schema.min_width_from(0);
        if bytes.len() < minimum {
            return Err(CodecError::SchemaMismatch(format!(
                "record of {} bytes is shorter than the minimum of {} bytes",
                bytes.len(),
                minimum
            )));
        }

        let (record, consumed) = self.decode_fields(bytes, schema, true)?;
        if consumed != bytes.len() {
            return Err(CodecError::SchemaMismatch(format!(
                "{} trailing bytes after last column",
                bytes.len() - consumed
            )));
        }
        Ok(record)
    }

    fn decode_fields(&self, bytes: &[u8], schema: &Schema, framed: bool) -> Result<(Record, usize), CodecError> {
        let mut cells = Vec::with_capacity(schema.len());
        let mut offset = 0;

        for (index, column) in schema.columns().iter().enumerate() {
            if *column.nullable() {
                let flag = *bytes.get(offset).ok_or(CodecError::TruncatedInput {
                    needed: offset + 1,
                    available: bytes.len(),
                })?;
                offset += 1;

                match flag {
                    PRESENCE_NULL => {
                        cells.push(Cell::Null);
                        continue;
                    }
                    PRESENCE_VALUE => {}
                    other => return Err(CodecError::InvalidPresenceFlag(other)),
                }
            }

            let (cell, read) = self
                .codec
                .decode(&bytes[offset..], *column.data_type())
                .map_err(|e| match at_offset(e, offset) {
                    // the frame is complete, a field running past its end is misaligned
                    CodecError::TruncatedInput { needed, available } if framed => CodecError::SchemaMismatch(format!(
                        "column '{}' needs {} bytes but the record has {}",
                        column.name(),
                        needed,
                        available
                    )),
                    other => other,
                })?;
            offset += read;
            cells.push(cell);

            // a varchar length is the only thing that can shift later columns
            if framed && *column.data_type() == DataType::VarChar {
                let remaining = bytes.len() - offset;
                let needed = schema.min_width_from(index + 1);
                if remaining < needed {
                    return Err(CodecError::SchemaMismatch(format!(
                        "column '{}' leaves {} bytes but the remaining columns need at least {}",
                        column.name(),
                        remaining,
                        needed
                    )));
                }
            }
        }

        Ok((Record { cells }, offset))
    }
}

// field level truncation -> position within the whole record
fn at_offset(err: CodecError, offset: usize) -> CodecError {
    match err {
        CodecError::TruncatedInput { needed, available } => CodecError::TruncatedInput {
            needed: needed + offset,
            available: available + offset,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::schema::ColumnDefinition;

    fn accounts_schema() -> Schema {
        Schema::new(vec![
            ColumnDefinition::new("id", DataType::Integer),
            ColumnDefinition::new("name", DataType::VarChar),
            ColumnDefinition::new("balance", DataType::DoublePrecision),
        ])
        .unwrap()
    }

    fn alice() -> Record {
        Record::new(vec![42.into(), "Alice".into(), 100.5.into()])
    }

    fn alice_bytes() -> Vec<u8> {
        let mut expected = vec![0x00, 0x00, 0x00, 0x2A];
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x05, 0x41, 0x6C, 0x69, 0x63, 0x65]);
        expected.extend_from_slice(&100.5f64.to_bits().to_be_bytes());
        expected
    }

    #[test]
    fn should_encode_accounts_row_exactly() {
        let encoder = RecordEncoder::default();
        let bytes = encoder.encode(&alice(), &accounts_schema()).unwrap();
        assert_eq!(bytes, alice_bytes());
    }

    #[test]
    fn should_decode_accounts_row_exactly() {
        let decoder = RecordDecoder::default();
        let bytes = alice_bytes();
        let (record, consumed) = decoder.decode(&bytes, &accounts_schema()).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(record, alice());
        assert!(matches!(&record.cells()[1], Cell::VarChar(s) if s == "Alice"));
    }

    #[test]
    fn should_reject_any_arity_mismatch() {
        let encoder = RecordEncoder::default();
        let schema = accounts_schema();

        for len in [0usize, 1, 2, 4, 7] {
            let record = Record::new(vec![Cell::Integer(1); len]);
            let result = encoder.encode(&record, &schema);
            assert_eq!(result.unwrap_err(), CodecError::Arity { expected: 3, actual: len });
        }
    }

    #[test]
    fn should_fail_on_every_strict_prefix() {
        let decoder = RecordDecoder::default();
        let schema = accounts_schema();
        let bytes = alice_bytes();

        for cut in 0..bytes.len() {
            let result = decoder.decode(&bytes[..cut], &schema);
            assert!(
                matches!(result, Err(CodecError::TruncatedInput { available, .. }) if available == cut),
                "prefix of {} bytes gave {:?}",
                cut,
                result
            );
        }
    }

    #[test]
    fn should_walk_back_to_back_records() {
        let encoder = RecordEncoder::default();
        let decoder = RecordDecoder::default();
        let schema = accounts_schema();
        let bob = Record::new(vec![7.into(), "Bob".into(), (-1.25).into()]);

        let mut buf = Vec::new();
        encoder.encode_into(&alice(), &schema, &mut buf).unwrap();
        encoder.encode_into(&bob, &schema, &mut buf).unwrap();

        let (first, consumed) = decoder.decode(&buf, &schema).unwrap();
        let (second, rest) = decoder.decode(&buf[consumed..], &schema).unwrap();
        assert_eq!(first, alice());
        assert_eq!(second, bob);
        assert_eq!(consumed + rest, buf.len());
    }

    #[test]
    fn should_leave_buffer_untouched_on_error() {
        let encoder = RecordEncoder::default();
        let schema = accounts_schema();
        let mut buf = vec![1, 2, 3];

        let record = Record::new(vec![42.into(), "Alice".into(), "not a number".into()]);
        let result = encoder.encode_into(&record, &schema, &mut buf);
        assert!(matches!(result, Err(CodecError::TypeMismatch { data_type: DataType::DoublePrecision, .. })));
        assert_eq!(buf, vec![1, 2, 3]);
    }

    #[test]
    fn should_write_presence_flags_for_nullable_columns() {
        let schema = Schema::new(vec![
            ColumnDefinition::new("id", DataType::SmallInt),
            ColumnDefinition::new_nullable("nickname", DataType::VarChar),
            ColumnDefinition::new_nullable("born", DataType::Date),
        ])
        .unwrap();
        let encoder = RecordEncoder::default();
        let decoder = RecordDecoder::default();

        let record = Record::new(vec![Cell::SmallInt(3), Cell::Null, NaiveDate::from_ymd_opt(2000, 1, 2).into()]);
        let bytes = encoder.encode(&record, &schema).unwrap();
        assert_eq!(bytes, vec![0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]);

        let (decoded, consumed) = decoder.decode(&bytes, &schema).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, 8);

        for cut in 0..bytes.len() {
            assert!(matches!(decoder.decode(&bytes[..cut], &schema), Err(CodecError::TruncatedInput { .. })));
        }
    }

    #[test]
    fn should_reject_null_in_non_nullable_column() {
        let encoder = RecordEncoder::default();
        let record = Record::new(vec![42.into(), Cell::Null, 1.0.into()]);
        let result = encoder.encode(&record, &accounts_schema());
        assert_eq!(result.unwrap_err(), CodecError::UnexpectedNull("name".to_string()));
    }

    #[test]
    fn should_reject_unknown_presence_flag() {
        let schema = Schema::new(vec![ColumnDefinition::new_nullable("id", DataType::Integer)]).unwrap();
        let result = RecordDecoder::default().decode(&[2, 0, 0, 0, 1], &schema);
        assert_eq!(result.unwrap_err(), CodecError::InvalidPresenceFlag(2));
    }

    #[test]
    fn should_detect_misaligned_varchar_in_frame() {
        let decoder = RecordDecoder::default();
        let schema = accounts_schema();

        // varchar claims the bytes of the following double
        let mut frame = vec![0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x0D];
        frame.extend_from_slice(b"Alice");
        frame.extend_from_slice(&100.5f64.to_bits().to_be_bytes());

        let result = decoder.decode_framed(&frame, &schema);
        assert!(matches!(result, Err(CodecError::SchemaMismatch(_))));
    }

    #[test]
    fn should_detect_varchar_length_past_frame_end() {
        let decoder = RecordDecoder::default();
        let schema = accounts_schema();

        // length 14, only 13 bytes follow it
        let mut frame = vec![0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x0E];
        frame.extend_from_slice(b"Alice");
        frame.extend_from_slice(&100.5f64.to_bits().to_be_bytes());

        let result = decoder.decode_framed(&frame, &schema);
        assert!(matches!(result, Err(CodecError::SchemaMismatch(msg)) if msg.contains("'name'")));

        // unframed the same bytes are simply short
        let result = decoder.decode(&frame, &schema);
        assert_eq!(result.unwrap_err(), CodecError::TruncatedInput { needed: 22, available: 21 });
    }

    #[test]
    fn should_detect_trailing_bytes_in_frame() {
        let decoder = RecordDecoder::default();
        let mut frame = alice_bytes();
        assert_eq!(decoder.decode_framed(&frame, &accounts_schema()).unwrap(), alice());

        frame.push(0);
        let result = decoder.decode_framed(&frame, &accounts_schema());
        assert!(matches!(result, Err(CodecError::SchemaMismatch(_))));
    }

    #[test]
    fn should_detect_frame_shorter_than_fixed_columns() {
        let result = RecordDecoder::default().decode_framed(&[0, 0, 0, 1], &accounts_schema());
        assert!(matches!(result, Err(CodecError::SchemaMismatch(_))));
    }
}
