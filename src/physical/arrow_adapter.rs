//! Columnar interop: read rows out of Arrow record batches and build record
//! batches from output rows.

use crate::error::{QueryError, Result};
use crate::physical::transport::RowSource;
use crate::types::{
    ColumnType, Datum, Row, RowSchema, ARROW_DECIMAL_PRECISION, ARROW_DECIMAL_SCALE,
};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float64Array,
    Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use futures::stream::{self, BoxStream, StreamExt};
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Stream of record batches
pub type RecordBatchStream = BoxStream<'static, Result<RecordBatch>>;

fn downcast<'a, T: 'static>(array: &'a ArrayRef, ty: ColumnType) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            QueryError::Decode(format!("{} column has array type {}", ty, array.data_type()))
        })
}

/// One batch with its columns cast to the canonical Arrow type of their
/// column type.
struct DecodedBatch {
    columns: Vec<ArrayRef>,
    num_rows: usize,
}

/// Row source reading from a stream of record batches
pub struct RecordBatchRowSource {
    schema: RowSchema,
    batches: RecordBatchStream,
    current: Option<DecodedBatch>,
    offset: usize,
}

impl RecordBatchRowSource {
    /// Fails with a decode error if the Arrow schema has a column type that
    /// has no row representation.
    pub fn try_new(arrow_schema: SchemaRef, batches: RecordBatchStream) -> Result<Self> {
        Ok(Self {
            schema: RowSchema::try_from_arrow(&arrow_schema)?,
            batches,
            current: None,
            offset: 0,
        })
    }

    pub fn from_batches(arrow_schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        Self::try_new(arrow_schema, stream::iter(batches.into_iter().map(Ok)).boxed())
    }

    fn decode(&self, batch: &RecordBatch) -> Result<DecodedBatch> {
        if batch.num_columns() != self.schema.len() {
            return Err(QueryError::Decode(format!(
                "record batch has {} columns, expected {}",
                batch.num_columns(),
                self.schema.len()
            )));
        }
        let columns = batch
            .columns()
            .iter()
            .zip(self.schema.fields())
            .map(|(array, field)| canonicalize(array, field.column_type))
            .collect::<Result<Vec<_>>>()?;
        Ok(DecodedBatch {
            columns,
            num_rows: batch.num_rows(),
        })
    }

    fn row_at(&self, batch: &DecodedBatch, row: usize) -> Result<Row> {
        batch
            .columns
            .iter()
            .zip(self.schema.fields())
            .map(|(array, field)| datum_at(array, field.column_type, row))
            .collect()
    }
}

#[async_trait]
impl RowSource for RecordBatchRowSource {
    fn schema(&self) -> &RowSchema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(batch) = &self.current {
                if self.offset < batch.num_rows {
                    let row = self.row_at(batch, self.offset)?;
                    self.offset += 1;
                    return Ok(Some(row));
                }
            }
            match self.batches.next().await {
                None => {
                    self.current = None;
                    return Ok(None);
                }
                Some(batch) => {
                    let decoded = self.decode(&batch?)?;
                    self.current = Some(decoded);
                    self.offset = 0;
                }
            }
        }
    }
}

/// Cast narrower or large-offset arrays to the type each column reads from.
fn canonicalize(array: &ArrayRef, ty: ColumnType) -> Result<ArrayRef> {
    let target = match (ty, array.data_type()) {
        (ColumnType::Decimal, DataType::Decimal128(_, _)) => return Ok(Arc::clone(array)),
        (ty, _) => ty.to_arrow(),
    };
    if array.data_type() == &target {
        Ok(Arc::clone(array))
    } else {
        Ok(cast(array, &target)?)
    }
}

fn datum_at(array: &ArrayRef, ty: ColumnType, row: usize) -> Result<Datum> {
    if array.is_null(row) {
        return Ok(Datum::Null);
    }
    let datum = match ty {
        ColumnType::Bool => Datum::Bool(downcast::<BooleanArray>(array, ty)?.value(row)),
        ColumnType::Int => Datum::Int(downcast::<Int64Array>(array, ty)?.value(row)),
        ColumnType::Float => {
            Datum::Float(OrderedFloat(downcast::<Float64Array>(array, ty)?.value(row)))
        }
        ColumnType::Decimal => {
            let decimals = downcast::<Decimal128Array>(array, ty)?;
            let mantissa = BigInt::from(decimals.value(row));
            Datum::Decimal(BigDecimal::new(mantissa, i64::from(decimals.scale())))
        }
        ColumnType::String => {
            Datum::String(downcast::<StringArray>(array, ty)?.value(row).to_string())
        }
        ColumnType::Bytes => Datum::Bytes(downcast::<BinaryArray>(array, ty)?.value(row).to_vec()),
        ColumnType::Date => Datum::Date(downcast::<Date32Array>(array, ty)?.value(row)),
        ColumnType::Timestamp => {
            Datum::Timestamp(downcast::<TimestampMicrosecondArray>(array, ty)?.value(row))
        }
    };
    Ok(datum)
}

fn mismatch(column: usize, ty: ColumnType, value: &Datum) -> QueryError {
    QueryError::Decode(format!("column {} of type {} holds value {}", column, ty, value))
}

macro_rules! collect_column {
    ($rows:expr, $idx:expr, $ty:expr, $variant:ident, |$v:ident| $conv:expr) => {
        $rows
            .iter()
            .map(|row| match &row[$idx] {
                Datum::Null => Ok(None),
                Datum::$variant($v) => Ok(Some($conv)),
                other => Err(mismatch($idx, $ty, other)),
            })
            .collect::<Result<Vec<_>>>()?
    };
}

/// Mantissa of `value` at the output scale, rounding extra fractional digits.
/// Values with more integer digits than the output precision allows are an
/// error.
fn decimal_to_i128(value: &BigDecimal) -> Result<i128> {
    let scale = i64::from(ARROW_DECIMAL_SCALE);
    let (mantissa, _) = value.round(scale).with_scale(scale).into_bigint_and_exponent();
    let limit = 10i128.pow(u32::from(ARROW_DECIMAL_PRECISION));
    i128::try_from(mantissa)
        .ok()
        .filter(|m| m.unsigned_abs() < limit.unsigned_abs())
        .ok_or_else(|| {
            QueryError::Overflow(format!(
                "decimal {} does not fit DECIMAL({}, {})",
                Datum::Decimal(value.clone()),
                ARROW_DECIMAL_PRECISION,
                ARROW_DECIMAL_SCALE
            ))
        })
}

/// Build a record batch from rows typed by `schema`.
pub fn rows_to_record_batch(schema: &RowSchema, rows: &[Row]) -> Result<RecordBatch> {
    if let Some(row) = rows.iter().find(|r| r.len() != schema.len()) {
        return Err(QueryError::Decode(format!(
            "row has {} columns, schema has {}",
            row.len(),
            schema.len()
        )));
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());
    for (idx, ty) in schema.column_types().into_iter().enumerate() {
        let array: ArrayRef = match ty {
            ColumnType::Bool => {
                Arc::new(BooleanArray::from(collect_column!(rows, idx, ty, Bool, |v| *v)))
            }
            ColumnType::Int => {
                Arc::new(Int64Array::from(collect_column!(rows, idx, ty, Int, |v| *v)))
            }
            ColumnType::Float => {
                Arc::new(Float64Array::from(collect_column!(rows, idx, ty, Float, |v| v.0)))
            }
            ColumnType::Decimal => {
                let mantissas = collect_column!(rows, idx, ty, Decimal, |v| v)
                    .into_iter()
                    .map(|v| v.map(decimal_to_i128).transpose())
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(
                    Decimal128Array::from(mantissas)
                        .with_precision_and_scale(ARROW_DECIMAL_PRECISION, ARROW_DECIMAL_SCALE)?,
                )
            }
            ColumnType::String => Arc::new(StringArray::from(collect_column!(
                rows,
                idx,
                ty,
                String,
                |v| v.as_str()
            ))),
            ColumnType::Bytes => Arc::new(BinaryArray::from_opt_vec(collect_column!(
                rows,
                idx,
                ty,
                Bytes,
                |v| v.as_slice()
            ))),
            ColumnType::Date => {
                Arc::new(Date32Array::from(collect_column!(rows, idx, ty, Date, |v| *v)))
            }
            ColumnType::Timestamp => Arc::new(TimestampMicrosecondArray::from(collect_column!(
                rows,
                idx,
                ty,
                Timestamp,
                |v| *v
            ))),
        };
        columns.push(array);
    }

    let arrow_schema = schema.to_arrow();
    if columns.is_empty() {
        let options =
            arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(rows.len()));
        return Ok(RecordBatch::try_new_with_options(arrow_schema, columns, &options)?);
    }
    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, LargeStringArray};
    use arrow::datatypes::{Field, Schema};

    fn dec(s: &str) -> Datum {
        Datum::Decimal(s.parse().unwrap())
    }

    #[tokio::test]
    async fn test_reads_rows_across_batches() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new("b", DataType::LargeUtf8, true),
        ]));
        let b1 = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![Some(1), None])),
                Arc::new(LargeStringArray::from(vec![Some("x"), Some("y")])),
            ],
        )
        .unwrap();
        let b2 = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![Some(3)])),
                Arc::new(LargeStringArray::from(vec![None::<&str>])),
            ],
        )
        .unwrap();

        let mut source = RecordBatchRowSource::from_batches(schema, vec![b1, b2]).unwrap();
        assert_eq!(
            source.schema().column_types(),
            vec![ColumnType::Int, ColumnType::String]
        );
        let mut rows = Vec::new();
        while let Some(row) = source.next_row().await.unwrap() {
            rows.push(row);
        }
        assert_eq!(
            rows,
            vec![
                vec![Datum::Int(1), Datum::from("x")],
                vec![Datum::Null, Datum::from("y")],
                vec![Datum::Int(3), Datum::Null],
            ]
        );
    }

    #[test]
    fn test_unsupported_column_type() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "l",
            DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
            true,
        )]));
        let err = RecordBatchRowSource::from_batches(schema, vec![]).err().unwrap();
        assert!(matches!(err, QueryError::Decode(_)));
    }

    #[test]
    fn test_rows_to_record_batch() {
        let schema =
            RowSchema::from_types([ColumnType::Int, ColumnType::Decimal, ColumnType::Bytes]);
        let rows = vec![
            vec![Datum::Int(1), dec("1.25"), Datum::Bytes(vec![1, 2])],
            vec![Datum::Null, Datum::Null, Datum::Null],
        ];
        let batch = rows_to_record_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let decimals = batch.column(1).as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(decimals.value(0), 12_500_000_000);
        assert!(decimals.is_null(1));
    }

    #[test]
    fn test_large_decimals_keep_their_magnitude() {
        let schema = RowSchema::from_types([ColumnType::Decimal]);
        let rows = vec![
            vec![dec("10000000000000000000")],
            vec![dec("-9999999999999999999999999999.25")],
            vec![dec("0.123456789012345")],
        ];
        let batch = rows_to_record_batch(&schema, &rows).unwrap();
        let decimals = batch.column(0).as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(decimals.value(0), 10i128.pow(29));
        assert_eq!(decimals.value_as_string(0), "10000000000000000000.0000000000");
        assert_eq!(decimals.value(1), -99999999999999999999999999992500000000);
        assert_eq!(decimals.value(2), 1_234_567_890);
    }

    #[test]
    fn test_decimal_beyond_output_precision() {
        let schema = RowSchema::from_types([ColumnType::Decimal]);
        let err = rows_to_record_batch(&schema, &[vec![dec("1e28")]]).unwrap_err();
        assert!(matches!(err, QueryError::Overflow(_)), "{}", err);
    }

    #[test]
    fn test_rows_to_record_batch_type_mismatch() {
        let schema = RowSchema::from_types([ColumnType::Int]);
        let err = rows_to_record_batch(&schema, &[vec![Datum::from("nope")]]).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }

    #[tokio::test]
    async fn test_batch_round_trip_through_source() {
        let schema = RowSchema::from_types([ColumnType::Decimal, ColumnType::Bool]);
        let rows = vec![vec![dec("-3.5"), Datum::Bool(true)]];
        let batch = rows_to_record_batch(&schema, &rows).unwrap();
        let mut source = RecordBatchRowSource::from_batches(batch.schema(), vec![batch]).unwrap();
        assert_eq!(source.next_row().await.unwrap(), Some(rows[0].clone()));
        assert_eq!(source.next_row().await.unwrap(), None);
    }
}
