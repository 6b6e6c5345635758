use std::{collections::HashMap, fmt, time::Duration};

use derive_getters::Getters;
use tracing::debug;
use ttl_cache::TtlCache;

use crate::schema::{ColumnDefinition, DataType, Schema, SchemaError};

/// Query a driver-backed catalog runs to describe a table.
/// Parameters: `$1` = table_schema, `$2` = table_name.
pub const COLUMNS_QUERY: &str = "\
SELECT
    column_name, data_type, is_nullable
FROM
    information_schema.columns
WHERE
    table_schema = $1 AND
    table_name = $2
ORDER BY
    ordinal_position";

/// `schema.table` pair naming a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
pub struct TableIdentifier {
    schema_name: String,
    table_name: String,
}

impl TableIdentifier {
    pub fn new(schema_name: &str, table_name: &str) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
        }
    }

    pub fn parse(identifier: &str) -> Result<Self, SchemaError> {
        match identifier.split_once('.') {
            Some((schema_name, table_name))
                if !schema_name.is_empty() && !table_name.is_empty() && !table_name.contains('.') =>
            {
                Ok(Self::new(schema_name, table_name))
            }
            _ => Err(SchemaError::InvalidTableIdentifier(identifier.to_string())),
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

/// One row of the columns query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

impl CatalogColumn {
    pub fn new(column_name: &str, data_type: &str, is_nullable: bool) -> Self {
        Self {
            column_name: column_name.to_string(),
            data_type: data_type.to_string(),
            is_nullable,
        }
    }
}

// Catalog is the only place metadata comes from; codecs never query it
pub trait Catalog {
    /// Columns of `table` in ordinal position order, empty if the table is unknown.
    fn columns(&self, table: &TableIdentifier) -> Result<Vec<CatalogColumn>, SchemaError>;
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn columns(&self, table: &TableIdentifier) -> Result<Vec<CatalogColumn>, SchemaError> {
        (**self).columns(table)
    }
}

impl Schema {
    /// Retrieves the schema of `table` (`schema.table` format) from the catalog.
    pub fn load<C: Catalog + ?Sized>(catalog: &C, table: &str) -> Result<Schema, SchemaError> {
        let identifier = TableIdentifier::parse(table)?;
        Self::load_identifier(catalog, &identifier)
    }

    pub fn load_identifier<C: Catalog + ?Sized>(catalog: &C, table: &TableIdentifier) -> Result<Schema, SchemaError> {
        let rows = catalog.columns(table)?;
        if rows.is_empty() {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }

        let columns = rows
            .iter()
            .map(|row| {
                let data_type = DataType::from_catalog_name(&row.data_type)?;
                Ok(if row.is_nullable {
                    ColumnDefinition::new_nullable(&row.column_name, data_type)
                } else {
                    ColumnDefinition::new(&row.column_name, data_type)
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        debug!(target: "pg_stream_copy", "loaded schema for {} ({} columns)", table, columns.len());
        Schema::new(columns)
    }
}

/// In-memory catalog, for offline use and tests.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    tables: HashMap<TableIdentifier, Vec<CatalogColumn>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: TableIdentifier, columns: Vec<CatalogColumn>) {
        self.tables.insert(table, columns);
    }
}

impl Catalog for StaticCatalog {
    fn columns(&self, table: &TableIdentifier) -> Result<Vec<CatalogColumn>, SchemaError> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }
}

/// Memoizes loaded schemas per table for a fixed time to live.
pub struct SchemaCache<C: Catalog> {
    catalog: C,
    cache: TtlCache<TableIdentifier, Schema>,
    ttl: Duration,
}

impl<C: Catalog> SchemaCache<C> {
    pub fn new(catalog: C, capacity: usize, ttl: Duration) -> Self {
        Self {
            catalog,
            cache: TtlCache::new(capacity),
            ttl,
        }
    }

    pub fn load(&mut self, table: &str) -> Result<Schema, SchemaError> {
        let identifier = TableIdentifier::parse(table)?;

        if let Some(schema) = self.cache.get(&identifier) {
            debug!(target: "pg_stream_copy", "schema cache hit for {}", identifier);
            return Ok(schema.clone());
        }

        debug!(target: "pg_stream_copy", "schema cache miss for {}", identifier);
        let schema = Schema::load_identifier(&self.catalog, &identifier)?;
        self.cache.insert(identifier, schema.clone(), self.ttl);
        Ok(schema)
    }

    /// Forget a cached schema, e.g. after the table was altered.
    pub fn invalidate(&mut self, table: &str) -> Result<(), SchemaError> {
        let identifier = TableIdentifier::parse(table)?;
        self.cache.remove(&identifier);
        Ok(())
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}
