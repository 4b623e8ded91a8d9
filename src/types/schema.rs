//! Column types and row schemas

use crate::error::{QueryError, Result};
use arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit};
use std::fmt;
use std::sync::Arc;

/// Precision and scale used when exchanging decimals with Arrow
pub const ARROW_DECIMAL_PRECISION: u8 = 38;
pub const ARROW_DECIMAL_SCALE: i8 = 10;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Bytes,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float | ColumnType::Decimal)
    }

    pub fn to_arrow(&self) -> ArrowDataType {
        match self {
            ColumnType::Bool => ArrowDataType::Boolean,
            ColumnType::Int => ArrowDataType::Int64,
            ColumnType::Float => ArrowDataType::Float64,
            ColumnType::Decimal => {
                ArrowDataType::Decimal128(ARROW_DECIMAL_PRECISION, ARROW_DECIMAL_SCALE)
            }
            ColumnType::String => ArrowDataType::Utf8,
            ColumnType::Bytes => ArrowDataType::Binary,
            ColumnType::Date => ArrowDataType::Date32,
            ColumnType::Timestamp => ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    pub fn try_from_arrow(data_type: &ArrowDataType) -> Result<Self> {
        match data_type {
            ArrowDataType::Boolean => Ok(ColumnType::Bool),
            ArrowDataType::Int8
            | ArrowDataType::Int16
            | ArrowDataType::Int32
            | ArrowDataType::Int64 => Ok(ColumnType::Int),
            ArrowDataType::Float32 | ArrowDataType::Float64 => Ok(ColumnType::Float),
            ArrowDataType::Decimal128(_, _) => Ok(ColumnType::Decimal),
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => Ok(ColumnType::String),
            ArrowDataType::Binary | ArrowDataType::LargeBinary => Ok(ColumnType::Bytes),
            ArrowDataType::Date32 => Ok(ColumnType::Date),
            ArrowDataType::Timestamp(TimeUnit::Microsecond, _) => Ok(ColumnType::Timestamp),
            other => Err(QueryError::Decode(format!(
                "unsupported Arrow column type {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "BOOL",
            ColumnType::Int => "INT",
            ColumnType::Float => "FLOAT",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::String => "STRING",
            ColumnType::Bytes => "BYTES",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        };
        write!(f, "{}", name)
    }
}

/// Schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub column_type: ColumnType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn to_arrow_field(&self) -> Field {
        Field::new(self.name.clone(), self.column_type.to_arrow(), true)
    }
}

/// Ordered column schema of a row stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSchema {
    fields: Vec<SchemaField>,
}

impl RowSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Schema with positional names `c0`, `c1`, ...
    pub fn from_types(types: impl IntoIterator<Item = ColumnType>) -> Self {
        let fields = types
            .into_iter()
            .enumerate()
            .map(|(i, t)| SchemaField::new(format!("c{}", i), t))
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_type(&self, idx: usize) -> Option<ColumnType> {
        self.fields.get(idx).map(|f| f.column_type)
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.fields.iter().map(|f| f.column_type).collect()
    }

    pub fn to_arrow(&self) -> Arc<ArrowSchema> {
        let fields: Vec<Field> = self.fields.iter().map(|f| f.to_arrow_field()).collect();
        Arc::new(ArrowSchema::new(fields))
    }

    pub fn try_from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                Ok(SchemaField::new(
                    f.name().clone(),
                    ColumnType::try_from_arrow(f.data_type())?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}
