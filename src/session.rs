use std::{
    io::{Read, Write},
    path::Path,
};

use thiserror::Error;
use tracing::info;

use crate::{
    config::CodecConfig,
    data::record::Record,
    schema::{
        Schema, SchemaError,
        catalog::{Catalog, TableIdentifier},
    },
    stream::{StreamError, StreamReader, StreamWriter, file_stream},
};

/// Bulk copy of one table: schema from the catalog, records through streams.
pub struct TableCopy {
    table: TableIdentifier,
    schema: Schema,
    config: CodecConfig,
}

#[derive(Error, Debug, PartialEq)]
pub enum CopyError {
    #[error("CopyError - schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("CopyError - stream error: {0}")]
    Stream(#[from] StreamError),
}

impl TableCopy {
    /// Loads the schema of `table` (`schema.table` format) once.
    pub fn new<C: Catalog + ?Sized>(catalog: &C, table: &str, config: CodecConfig) -> Result<Self, CopyError> {
        let table = TableIdentifier::parse(table)?;
        let schema = Schema::load_identifier(catalog, &table)?;
        Ok(Self::with_schema(table, schema, config))
    }

    /// Session over an already known schema, no catalog involved.
    pub fn with_schema(table: TableIdentifier, schema: Schema, config: CodecConfig) -> Self {
        Self { table, schema, config }
    }

    pub fn table(&self) -> &TableIdentifier {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Writes all records as one complete stream. Returns the number of records written.
    pub fn export<'r, I, W>(&self, records: I, sink: W) -> Result<u64, CopyError>
    where
        I: IntoIterator<Item = &'r Record>,
        W: Write,
    {
        let writer = StreamWriter::open(sink, &self.schema, &self.config)?;
        self.write_all(writer, records)
    }

    pub fn export_to_path<'r, I>(&self, records: I, path: &Path) -> Result<u64, CopyError>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let writer = file_stream::create_file(path, &self.schema, &self.config)?;
        self.write_all(writer, records)
    }

    /// Reads one complete stream.
    pub fn import<R: Read>(&self, source: R) -> Result<Vec<Record>, CopyError> {
        let reader = StreamReader::open(source, &self.schema, &self.config)?;
        self.read_all(reader)
    }

    pub fn import_from_path(&self, path: &Path) -> Result<Vec<Record>, CopyError> {
        let reader = file_stream::open_file(path, &self.schema, &self.config)?;
        self.read_all(reader)
    }

    fn write_all<'r, I, W>(&self, mut writer: StreamWriter<'_, W>, records: I) -> Result<u64, CopyError>
    where
        I: IntoIterator<Item = &'r Record>,
        W: Write,
    {
        for record in records {
            writer.write(record)?;
        }
        writer.close()?;

        info!(target: "pg_stream_copy", "exported {} records of {}", writer.records_written(), self.table);
        Ok(writer.records_written())
    }

    fn read_all<R: Read>(&self, mut reader: StreamReader<'_, R>) -> Result<Vec<Record>, CopyError> {
        let mut records = Vec::new();
        while let Some(record) = reader.next_record()? {
            records.push(record);
        }

        info!(target: "pg_stream_copy", "imported {} records of {}", records.len(), self.table);
        Ok(records)
    }
}
