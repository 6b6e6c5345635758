//! Binary bulk-copy codec for Postgres tables.
//!
//! A [`Schema`] loaded through a [`Catalog`] decides how each column of a
//! [`Record`] is laid out on the wire; [`StreamWriter`] and [`StreamReader`]
//! frame many records into one bulk-copy stream.

pub mod config;
pub mod data;
pub mod schema;
pub mod session;
pub mod stream;

pub use config::{CodecConfig, ConfigError};
pub use data::{
    CodecError,
    cell::{Cell, TypeCodec},
    record::{Record, RecordDecoder, RecordEncoder},
};
pub use schema::{
    ColumnDefinition, DataType, Schema, SchemaError,
    catalog::{Catalog, CatalogColumn, SchemaCache, StaticCatalog, TableIdentifier},
};
pub use session::{CopyError, TableCopy};
pub use stream::{StreamError, StreamReader, StreamWriter};
