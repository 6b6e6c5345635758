pub mod file_stream;

use std::io::{ErrorKind, Read, Write};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    config::CodecConfig,
    data::{
        CodecError,
        record::{Record, RecordDecoder, RecordEncoder},
    },
    schema::{DataType, Schema},
};

// Stream Layout
// ------------
// magic (4 bytes)
// column count (2 bytes)
// type tags (1 byte per column, only with typed headers)
// ------------
// record length (4 bytes)
// record bytes
// ...
// ------------
// trailer (4 bytes, all ones)
pub struct FrameLayout;

impl FrameLayout {
    pub const MAGIC: [u8; 4] = *b"PGSC";
    pub const COLUMN_COUNT_SIZE: usize = 2;
    pub const TRAILER: u32 = u32::MAX;
    pub const MAX_COLUMNS: usize = u16::MAX as usize;
}

#[derive(Error, Debug, PartialEq)]
pub enum StreamError {
    #[error("StreamError - bad magic {0:02x?}")]
    BadMagic(Vec<u8>),
    #[error("StreamError - stream is already closed")]
    Closed,
    #[error("StreamError - read past the end of the stream")]
    EndOfStream,
    #[error("StreamError - stream does not match schema: {0}")]
    SchemaMismatch(String),
    #[error("StreamError - schema has {0} columns, at most 65535 fit the header")]
    TooManyColumns(usize),
    #[error("StreamError - stream is invalid after an earlier error")]
    Invalidated,
    #[error("StreamError - {0}")]
    Codec(#[from] CodecError),
    #[error("StreamError - I/O Error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
    Failed,
}

/// Writes records of one schema as a framed bulk-copy stream.
pub struct StreamWriter<'s, W: Write> {
    sink: Option<W>,
    schema: &'s Schema,
    encoder: RecordEncoder,
    max_record_len: u32,
    state: StreamState,
    buf: Vec<u8>,
    records_written: u64,
}

impl<'s, W: Write> StreamWriter<'s, W> {
    /// Writes the stream header.
    pub fn open(mut sink: W, schema: &'s Schema, config: &CodecConfig) -> Result<Self, StreamError> {
        if schema.len() > FrameLayout::MAX_COLUMNS {
            return Err(StreamError::TooManyColumns(schema.len()));
        }

        let mut header = Vec::with_capacity(FrameLayout::MAGIC.len() + FrameLayout::COLUMN_COUNT_SIZE + schema.len());
        header.extend_from_slice(&FrameLayout::MAGIC);
        header.extend_from_slice(&(schema.len() as u16).to_be_bytes());
        if *config.typed_header() {
            header.extend(schema.columns().iter().map(|c| c.data_type().tag()));
        }
        sink.write_all(&header)?;

        debug!(target: "pg_stream_copy", "stream opened for writing: {} columns, typed header {}", schema.len(), config.typed_header());
        Ok(Self {
            sink: Some(sink),
            schema,
            encoder: RecordEncoder::new(config),
            max_record_len: *config.max_record_len(),
            state: StreamState::Open,
            buf: Vec::new(),
            records_written: 0,
        })
    }

    pub fn write(&mut self, record: &Record) -> Result<(), StreamError> {
        self.ensure_open()?;

        // encoding errors leave the stream intact, nothing was written yet
        self.buf.clear();
        self.encoder.encode_into(record, self.schema, &mut self.buf)?;
        if self.buf.len() > self.max_record_len as usize {
            return Err(CodecError::InvalidLength {
                length: self.buf.len() as u64,
                max: self.max_record_len as u64,
            }
            .into());
        }

        let length = (self.buf.len() as u32).to_be_bytes();
        let result = match self.sink.as_mut() {
            Some(sink) => sink.write_all(&length).and_then(|_| sink.write_all(&self.buf)),
            None => return Err(StreamError::Closed),
        };
        self.fail_on_error(result)?;

        self.records_written += 1;
        trace!(target: "pg_stream_copy", "wrote record {} ({} bytes)", self.records_written, self.buf.len());
        Ok(())
    }

    /// Writes the trailer and flushes the sink.
    pub fn close(&mut self) -> Result<(), StreamError> {
        self.ensure_open()?;

        let result = match self.sink.as_mut() {
            Some(sink) => sink
                .write_all(&FrameLayout::TRAILER.to_be_bytes())
                .and_then(|_| sink.flush()),
            None => return Err(StreamError::Closed),
        };
        self.fail_on_error(result)?;

        self.state = StreamState::Closed;
        debug!(target: "pg_stream_copy", "stream closed after {} records", self.records_written);
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Gives back the sink; call `close` first to get a complete stream.
    pub fn into_inner(mut self) -> Result<W, StreamError> {
        let sink = self.sink.take().ok_or(StreamError::Closed)?;
        Ok(sink)
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        match self.state {
            StreamState::Open => Ok(()),
            StreamState::Closed => Err(StreamError::Closed),
            StreamState::Failed => Err(StreamError::Invalidated),
        }
    }

    fn fail_on_error(&mut self, result: std::io::Result<()>) -> Result<(), StreamError> {
        result.map_err(|err| {
            self.state = StreamState::Failed;
            StreamError::from(err)
        })
    }
}

impl<W: Write> Drop for StreamWriter<'_, W> {
    fn drop(&mut self) {
        if self.state == StreamState::Open {
            warn!(target: "pg_stream_copy", "stream writer dropped without close, {} records have no trailer", self.records_written);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    Finished,
    Failed,
}

/// Reads a framed bulk-copy stream back into records, forward only.
pub struct StreamReader<'s, R: Read> {
    source: R,
    schema: &'s Schema,
    decoder: RecordDecoder,
    max_record_len: u32,
    state: ReadState,
    records_read: u64,
}

impl<'s, R: Read> StreamReader<'s, R> {
    /// Reads and validates the stream header against `schema`.
    pub fn open(mut source: R, schema: &'s Schema, config: &CodecConfig) -> Result<Self, StreamError> {
        let magic: [u8; 4] = read_array(&mut source)?;
        if magic != FrameLayout::MAGIC {
            return Err(StreamError::BadMagic(magic.to_vec()));
        }

        let column_count = u16::from_be_bytes(read_array(&mut source)?) as usize;
        if column_count != schema.len() {
            return Err(StreamError::SchemaMismatch(format!(
                "stream has {} columns, schema has {}",
                column_count,
                schema.len()
            )));
        }

        if *config.typed_header() {
            let mut tags = vec![0u8; column_count];
            let read = read_up_to(&mut source, &mut tags)?;
            if read < column_count {
                return Err(truncated(column_count, read));
            }

            for (tag, column) in tags.iter().zip(schema.columns().iter()) {
                if *tag != column.data_type().tag() {
                    let found = DataType::from_tag(*tag)
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| format!("tag {:#04x}", tag));
                    return Err(StreamError::SchemaMismatch(format!(
                        "column '{}' is {} in the schema but {} in the stream",
                        column.name(),
                        column.data_type(),
                        found
                    )));
                }
            }
        }

        debug!(target: "pg_stream_copy", "stream opened for reading: {} columns", column_count);
        Ok(Self {
            source,
            schema,
            decoder: RecordDecoder::new(config),
            max_record_len: *config.max_record_len(),
            state: ReadState::Reading,
            records_read: 0,
        })
    }

    /// `Ok(None)` once when the trailer is reached, `EndOfStream` afterwards.
    pub fn next_record(&mut self) -> Result<Option<Record>, StreamError> {
        match self.state {
            ReadState::Reading => {}
            ReadState::Finished => return Err(StreamError::EndOfStream),
            ReadState::Failed => return Err(StreamError::Invalidated),
        }

        let result = self.read_frame();
        match &result {
            Ok(None) => {
                self.state = ReadState::Finished;
                debug!(target: "pg_stream_copy", "stream trailer reached after {} records", self.records_read);
            }
            Ok(Some(_)) => self.records_read += 1,
            Err(err) => {
                self.state = ReadState::Failed;
                warn!(target: "pg_stream_copy", "stream read failed after {} records: {}", self.records_read, err);
            }
        }
        result
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn read_frame(&mut self) -> Result<Option<Record>, StreamError> {
        let length = u32::from_be_bytes(read_array(&mut self.source)?);
        if length == FrameLayout::TRAILER {
            return Ok(None);
        }
        if length > self.max_record_len {
            return Err(CodecError::InvalidLength {
                length: length as u64,
                max: self.max_record_len as u64,
            }
            .into());
        }

        // grows with the data actually present instead of trusting the length
        let mut payload = Vec::new();
        (&mut self.source).take(length as u64).read_to_end(&mut payload)?;
        if payload.len() < length as usize {
            return Err(truncated(length as usize, payload.len()));
        }

        trace!(target: "pg_stream_copy", "read record {} ({} bytes)", self.records_read + 1, length);
        let record = self.decoder.decode_framed(&payload, self.schema)?;
        Ok(Some(record))
    }
}

impl<R: Read> Iterator for StreamReader<'_, R> {
    type Item = Result<Record, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) | Err(StreamError::EndOfStream) | Err(StreamError::Invalidated) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn truncated(needed: usize, available: usize) -> StreamError {
    CodecError::TruncatedInput { needed, available }.into()
}

fn read_array<R: Read, const N: usize>(source: &mut R) -> Result<[u8; N], StreamError> {
    let mut buf = [0u8; N];
    let read = read_up_to(source, &mut buf)?;
    if read < N {
        return Err(truncated(N, read));
    }
    Ok(buf)
}

fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
