use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter},
    path::Path,
};

use crate::{
    config::CodecConfig,
    schema::Schema,
    stream::{StreamError, StreamReader, StreamWriter},
};

/// Creates (or truncates) `path` and writes the stream header into it.
/// The file handle is released when the writer is dropped.
pub fn create_file<'s>(
    path: &Path,
    schema: &'s Schema,
    config: &CodecConfig,
) -> Result<StreamWriter<'s, BufWriter<File>>, StreamError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    StreamWriter::open(BufWriter::new(file), schema, config)
}

pub fn open_file<'s>(
    path: &Path,
    schema: &'s Schema,
    config: &CodecConfig,
) -> Result<StreamReader<'s, BufReader<File>>, StreamError> {
    let file = OpenOptions::new().read(true).open(path)?;

    StreamReader::open(BufReader::new(file), schema, config)
}
