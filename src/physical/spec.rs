//! Aggregator specification types

use crate::error::{QueryError, Result};
use crate::types::{ColumnType, RowSchema};
use std::fmt;
use std::str::FromStr;

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    AnyNotNull,
    Avg,
    BoolAnd,
    BoolOr,
    Count,
    CountRows,
    Max,
    Min,
    Stddev,
    Sum,
    SumInt,
    Variance,
    XorAgg,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 13] = [
        AggregateFunction::AnyNotNull,
        AggregateFunction::Avg,
        AggregateFunction::BoolAnd,
        AggregateFunction::BoolOr,
        AggregateFunction::Count,
        AggregateFunction::CountRows,
        AggregateFunction::Max,
        AggregateFunction::Min,
        AggregateFunction::Stddev,
        AggregateFunction::Sum,
        AggregateFunction::SumInt,
        AggregateFunction::Variance,
        AggregateFunction::XorAgg,
    ];

    /// Number of input columns the function consumes
    pub fn arity(&self) -> usize {
        match self {
            AggregateFunction::CountRows => 0,
            _ => 1,
        }
    }

    /// Output type for the given input column types, or a type error if the
    /// function cannot consume them. `inputs` must already match `arity()`.
    pub fn return_type(&self, inputs: &[ColumnType]) -> Result<ColumnType> {
        let input = match inputs.first() {
            Some(t) => *t,
            None => return Ok(ColumnType::Int), // COUNT_ROWS
        };
        let out = match (self, input) {
            (AggregateFunction::Count, _) => ColumnType::Int,
            (
                AggregateFunction::AnyNotNull | AggregateFunction::Min | AggregateFunction::Max,
                t,
            ) => t,
            (
                AggregateFunction::Sum
                | AggregateFunction::Avg
                | AggregateFunction::Stddev
                | AggregateFunction::Variance,
                ColumnType::Int | ColumnType::Decimal,
            ) => ColumnType::Decimal,
            (
                AggregateFunction::Sum
                | AggregateFunction::Avg
                | AggregateFunction::Stddev
                | AggregateFunction::Variance,
                ColumnType::Float,
            ) => ColumnType::Float,
            (AggregateFunction::SumInt, ColumnType::Int) => ColumnType::Int,
            (AggregateFunction::XorAgg, ColumnType::Int) => ColumnType::Int,
            (AggregateFunction::XorAgg, ColumnType::Bytes) => ColumnType::Bytes,
            (AggregateFunction::BoolAnd | AggregateFunction::BoolOr, ColumnType::Bool) => {
                ColumnType::Bool
            }
            (func, t) => {
                return Err(QueryError::TypeMismatch(format!(
                    "{} does not accept an argument of type {}",
                    func, t
                )))
            }
        };
        Ok(out)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::AnyNotNull => "ANY_NOT_NULL",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::BoolAnd => "BOOL_AND",
            AggregateFunction::BoolOr => "BOOL_OR",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountRows => "COUNT_ROWS",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Stddev => "STDDEV",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::SumInt => "SUM_INT",
            AggregateFunction::Variance => "VARIANCE",
            AggregateFunction::XorAgg => "XOR_AGG",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AggregateFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        AggregateFunction::ALL
            .iter()
            .copied()
            .find(|f| f.to_string() == upper)
            .ok_or_else(|| QueryError::UnknownFunction(s.to_string()))
    }
}

/// One requested output aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    pub func: AggregateFunction,
    pub input_columns: Vec<usize>,
    pub distinct: bool,
    /// Boolean column gating this aggregation; only TRUE rows contribute
    pub filter_column: Option<usize>,
}

impl AggregationSpec {
    pub fn new(func: AggregateFunction, input_columns: impl Into<Vec<usize>>) -> Self {
        Self {
            func,
            input_columns: input_columns.into(),
            distinct: false,
            filter_column: None,
        }
    }

    /// COUNT_ROWS, the zero-argument row counter
    pub fn count_rows() -> Self {
        Self::new(AggregateFunction::CountRows, Vec::new())
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn filtered(mut self, column: usize) -> Self {
        self.filter_column = Some(column);
        self
    }
}

impl fmt::Display for AggregationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.input_columns.iter().map(|c| format!("@{}", c)).collect();
        write!(f, "{}(", self.func)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{})", cols.join(", "))?;
        if let Some(c) = self.filter_column {
            write!(f, " FILTER @{}", c)?;
        }
        Ok(())
    }
}

/// Full grouping and aggregation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorSpec {
    /// Columns forming the group key; order does not affect grouping
    pub group_columns: Vec<usize>,
    /// Subsequence of `group_columns` known to arrive sorted ascending
    pub ordered_group_columns: Vec<usize>,
    pub aggregations: Vec<AggregationSpec>,
}

impl AggregatorSpec {
    pub fn new(aggregations: Vec<AggregationSpec>) -> Self {
        Self {
            group_columns: Vec::new(),
            ordered_group_columns: Vec::new(),
            aggregations,
        }
    }

    pub fn with_group_columns(mut self, columns: impl Into<Vec<usize>>) -> Self {
        self.group_columns = columns.into();
        self
    }

    pub fn with_ordered_group_columns(mut self, columns: impl Into<Vec<usize>>) -> Self {
        self.ordered_group_columns = columns.into();
        self
    }

    /// Check every column reference and function signature against the input
    /// schema and return the output schema, one column per aggregation.
    pub fn output_schema(&self, input: &RowSchema) -> Result<RowSchema> {
        let arity = input.len();
        let check = |index: usize, context: &str| -> Result<ColumnType> {
            input
                .column_type(index)
                .ok_or_else(|| QueryError::ColumnOutOfRange {
                    index,
                    arity,
                    context: context.to_string(),
                })
        };

        for &c in &self.group_columns {
            check(c, "group column")?;
        }
        for (i, &c) in self.ordered_group_columns.iter().enumerate() {
            check(c, "ordered group column")?;
            if !self.group_columns.contains(&c) {
                return Err(QueryError::InvalidSpec(format!(
                    "ordered group column @{} is not a group column",
                    c
                )));
            }
            if self.ordered_group_columns[..i].contains(&c) {
                return Err(QueryError::InvalidSpec(format!(
                    "ordered group column @{} listed twice",
                    c
                )));
            }
        }

        let mut types = Vec::with_capacity(self.aggregations.len());
        for agg in &self.aggregations {
            if agg.input_columns.len() != agg.func.arity() {
                return Err(QueryError::ArityMismatch {
                    func: agg.func.to_string(),
                    expected: agg.func.arity(),
                    actual: agg.input_columns.len(),
                });
            }
            let inputs = agg
                .input_columns
                .iter()
                .map(|&c| check(c, &format!("{} argument", agg.func)))
                .collect::<Result<Vec<_>>>()?;
            if let Some(f) = agg.filter_column {
                let ty = check(f, &format!("{} filter", agg.func))?;
                if ty != ColumnType::Bool {
                    return Err(QueryError::TypeMismatch(format!(
                        "filter column @{} of {} must be BOOL, found {}",
                        f, agg.func, ty
                    )));
                }
            }
            types.push(agg.func.return_type(&inputs)?);
        }
        Ok(RowSchema::from_types(types))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(n: usize) -> RowSchema {
        RowSchema::from_types(std::iter::repeat(ColumnType::Int).take(n))
    }

    #[test]
    fn test_function_names() {
        for f in AggregateFunction::ALL {
            assert_eq!(f.to_string().parse::<AggregateFunction>().unwrap(), f);
        }
        assert_eq!("sum_int".parse::<AggregateFunction>().unwrap(), AggregateFunction::SumInt);
        assert!(matches!(
            "CONCAT_AGG".parse::<AggregateFunction>(),
            Err(QueryError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_output_schema_types() {
        let spec = AggregatorSpec::new(vec![
            AggregationSpec::new(AggregateFunction::Min, [0]),
            AggregationSpec::new(AggregateFunction::Count, [0]),
            AggregationSpec::new(AggregateFunction::Avg, [0]),
            AggregationSpec::new(AggregateFunction::SumInt, [0]),
            AggregationSpec::count_rows(),
        ]);
        let out = spec.output_schema(&ints(1)).unwrap();
        assert_eq!(
            out.column_types(),
            vec![
                ColumnType::Int,
                ColumnType::Int,
                ColumnType::Decimal,
                ColumnType::Int,
                ColumnType::Int
            ]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let spec =
            AggregatorSpec::new(vec![AggregationSpec::new(AggregateFunction::CountRows, [0])]);
        assert!(matches!(
            spec.output_schema(&ints(1)),
            Err(QueryError::ArityMismatch { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let input = RowSchema::from_types([ColumnType::String]);
        let spec = AggregatorSpec::new(vec![AggregationSpec::new(AggregateFunction::Stddev, [0])]);
        assert!(matches!(spec.output_schema(&input), Err(QueryError::TypeMismatch(_))));
    }

    #[test]
    fn test_filter_must_be_bool() {
        let spec = AggregatorSpec::new(vec![
            AggregationSpec::new(AggregateFunction::Count, [0]).filtered(1),
        ]);
        assert!(matches!(spec.output_schema(&ints(2)), Err(QueryError::TypeMismatch(_))));
    }

    #[test]
    fn test_out_of_range_columns() {
        let spec = AggregatorSpec::new(vec![]).with_group_columns([3]);
        assert!(matches!(
            spec.output_schema(&ints(2)),
            Err(QueryError::ColumnOutOfRange { index: 3, arity: 2, .. })
        ));

        let spec = AggregatorSpec::new(vec![AggregationSpec::new(AggregateFunction::Sum, [5])]);
        assert!(matches!(
            spec.output_schema(&ints(2)),
            Err(QueryError::ColumnOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn test_ordered_columns_must_be_grouped() {
        let spec = AggregatorSpec::new(vec![])
            .with_group_columns([0])
            .with_ordered_group_columns([1]);
        assert!(matches!(spec.output_schema(&ints(2)), Err(QueryError::InvalidSpec(_))));
    }

    #[test]
    fn test_display() {
        let agg = AggregationSpec::new(AggregateFunction::Sum, [2]).distinct().filtered(3);
        assert_eq!(agg.to_string(), "SUM(DISTINCT @2) FILTER @3");
    }
}
