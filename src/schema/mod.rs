pub mod catalog;

use std::fmt;

use derive_getters::Getters;
use thiserror::Error;

/// Scalar kinds a column can carry on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType { // Byte tag
    SmallInt,        // 0x01
    Integer,         // 0x02
    BigInt,          // 0x03
    DoublePrecision, // 0x04
    VarChar,         // 0x05 length is stored in front of the bytes
    Date,            // 0x06
}

// information_schema.columns.data_type -> DataType
static CATALOG_TYPE_NAMES: [(&str, DataType); 6] = [
    ("smallint", DataType::SmallInt),
    ("integer", DataType::Integer),
    ("bigint", DataType::BigInt),
    ("double precision", DataType::DoublePrecision),
    ("character varying", DataType::VarChar),
    ("date", DataType::Date),
];

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::SmallInt,
        DataType::Integer,
        DataType::BigInt,
        DataType::DoublePrecision,
        DataType::VarChar,
        DataType::Date,
    ];

    /// Width of the encoded value, `None` for length-prefixed kinds.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::SmallInt => Some(2),
            DataType::Integer => Some(4),
            DataType::BigInt => Some(8),
            DataType::DoublePrecision => Some(8),
            DataType::VarChar => None,
            DataType::Date => Some(4),
        }
    }

    /// Smallest number of bytes any value of this kind occupies.
    pub fn min_width(&self) -> usize {
        self.fixed_width().unwrap_or(4)
    }

    pub fn tag(&self) -> u8 {
        match self {
            DataType::SmallInt => 0x01,
            DataType::Integer => 0x02,
            DataType::BigInt => 0x03,
            DataType::DoublePrecision => 0x04,
            DataType::VarChar => 0x05,
            DataType::Date => 0x06,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn catalog_name(&self) -> &'static str {
        CATALOG_TYPE_NAMES
            .iter()
            .find(|(_, t)| t == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn from_catalog_name(name: &str) -> Result<Self, SchemaError> {
        CATALOG_TYPE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .ok_or_else(|| SchemaError::UnsupportedType(name.to_string()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct ColumnDefinition {
    name: String,
    data_type: DataType,
    /// Field is preceded by a presence byte (0 = null, 1 = value follows).
    nullable: bool,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: false,
        }
    }

    pub fn new_nullable(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
        }
    }

    /// Smallest number of bytes this field occupies inside a record.
    pub fn min_width(&self) -> usize {
        if self.nullable {
            // a null is just the presence byte
            1
        } else {
            self.data_type.min_width()
        }
    }
}

/// Column layout of a table, in ordinal position order.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Schema {
    columns: Vec<ColumnDefinition>,
}

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("SchemaError - unsupported type '{0}'")]
    UnsupportedType(String),
    #[error("SchemaError - a schema needs at least one column")]
    EmptySchema,
    #[error("SchemaError - column at position {0} has an empty name")]
    EmptyColumnName(usize),
    #[error("SchemaError - invalid table identifier '{0}', expected schema.table")]
    InvalidTableIdentifier(String),
    #[error("SchemaError - table '{0}' not found in catalog")]
    TableNotFound(String),
    #[error("SchemaError - catalog error: {0}")]
    CatalogError(String),
}

impl Schema {
    pub fn new(columns: Vec<ColumnDefinition>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::EmptySchema);
        }
        if let Some(position) = columns.iter().position(|c| c.name.is_empty()) {
            return Err(SchemaError::EmptyColumnName(position));
        }

        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Minimum number of bytes needed by the columns starting at `from`.
    pub fn min_width_from(&self, from: usize) -> usize {
        self.columns.iter().skip(from).map(|c| c.min_width()).sum()
    }
}
