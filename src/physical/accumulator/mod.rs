//! Accumulator protocol
//!
//! Every aggregate function is a type implementing [`Accumulator`]. The
//! concrete type for an aggregation is chosen once, when the aggregator is
//! built, and captured in an [`AccumulatorFactory`]; the row loop then only
//! calls through the trait object.

mod distinct;
mod functions;

pub use distinct::DistinctAccumulator;
pub use functions::*;

use crate::error::{QueryError, Result};
use crate::physical::spec::AggregateFunction;
use crate::types::{ColumnType, Datum};
use std::fmt::Debug;

/// Running state of one aggregate function over one group
pub trait Accumulator: Send + Debug {
    /// Fold one qualifying row's arguments into the state
    fn add(&mut self, args: &[Datum]) -> Result<()>;

    /// Current result. Does not mutate state and may be called repeatedly.
    fn finalize(&self) -> Result<Datum>;

    /// Return to the identity state, as if newly created
    fn reset(&mut self);

    /// Approximate bytes held, including heap allocations
    fn size(&self) -> usize;
}

type Constructor = fn() -> Box<dyn Accumulator>;

/// Creates accumulators for one aggregation, resolved from the function kind
/// and argument type at build time.
#[derive(Clone)]
pub struct AccumulatorFactory {
    func: AggregateFunction,
    constructor: Constructor,
    distinct: bool,
}

impl Debug for AccumulatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulatorFactory")
            .field("func", &self.func)
            .field("distinct", &self.distinct)
            .finish()
    }
}

impl AccumulatorFactory {
    /// Resolve the accumulator implementation for `func` over `inputs`.
    pub fn try_new(func: AggregateFunction, inputs: &[ColumnType], distinct: bool) -> Result<Self> {
        func.return_type(inputs)?;
        let constructor = resolve(func, inputs.first().copied())?;
        Ok(Self {
            func,
            constructor,
            distinct,
        })
    }

    pub fn func(&self) -> AggregateFunction {
        self.func
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn create(&self) -> Box<dyn Accumulator> {
        let inner = (self.constructor)();
        if self.distinct {
            Box::new(DistinctAccumulator::new(inner))
        } else {
            inner
        }
    }
}

fn resolve(func: AggregateFunction, input: Option<ColumnType>) -> Result<Constructor> {
    use AggregateFunction as F;
    use ColumnType as T;

    let ctor: Constructor = match (func, input) {
        (F::CountRows, None) => || Box::new(CountRowsAccumulator::default()),
        (F::Count, Some(_)) => || Box::new(CountAccumulator::default()),
        (F::AnyNotNull, Some(_)) => || Box::new(AnyNotNullAccumulator::default()),
        (F::Min, Some(_)) => || Box::new(MinMaxAccumulator::min()),
        (F::Max, Some(_)) => || Box::new(MinMaxAccumulator::max()),
        (F::Sum, Some(T::Int | T::Decimal)) => || Box::new(DecimalSumAccumulator::default()),
        (F::Sum, Some(T::Float)) => || Box::new(FloatSumAccumulator::default()),
        (F::SumInt, Some(T::Int)) => || Box::new(IntSumAccumulator::default()),
        (F::Avg, Some(T::Int | T::Decimal)) => || Box::new(DecimalAvgAccumulator::default()),
        (F::Avg, Some(T::Float)) => || Box::new(FloatAvgAccumulator::default()),
        (F::Variance, Some(T::Int | T::Decimal)) => {
            || Box::new(DecimalVarianceAccumulator::variance())
        }
        (F::Variance, Some(T::Float)) => || Box::new(FloatVarianceAccumulator::variance()),
        (F::Stddev, Some(T::Int | T::Decimal)) => || Box::new(DecimalVarianceAccumulator::stddev()),
        (F::Stddev, Some(T::Float)) => || Box::new(FloatVarianceAccumulator::stddev()),
        (F::XorAgg, Some(T::Int)) => || Box::new(IntXorAccumulator::default()),
        (F::XorAgg, Some(T::Bytes)) => || Box::new(BytesXorAccumulator::default()),
        (F::BoolAnd, Some(T::Bool)) => || Box::new(BoolAccumulator::and()),
        (F::BoolOr, Some(T::Bool)) => || Box::new(BoolAccumulator::or()),
        (func, input) => {
            return Err(QueryError::TypeMismatch(format!(
                "no {} implementation for argument type {}",
                func,
                input.map_or_else(|| "<none>".to_string(), |t| t.to_string())
            )))
        }
    };
    Ok(ctor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_resolves_every_valid_signature() {
        let types = [
            ColumnType::Bool,
            ColumnType::Int,
            ColumnType::Float,
            ColumnType::Decimal,
            ColumnType::String,
            ColumnType::Bytes,
            ColumnType::Date,
            ColumnType::Timestamp,
        ];
        for func in AggregateFunction::ALL {
            if func.arity() == 0 {
                assert!(AccumulatorFactory::try_new(func, &[], false).is_ok());
                continue;
            }
            for ty in types {
                let typed = func.return_type(&[ty]).is_ok();
                let built = AccumulatorFactory::try_new(func, &[ty], false).is_ok();
                assert_eq!(typed, built, "{} over {}", func, ty);
            }
        }
    }

    #[test]
    fn test_distinct_factory_wraps() {
        let factory =
            AccumulatorFactory::try_new(AggregateFunction::Count, &[ColumnType::Int], true)
                .unwrap();
        assert!(factory.is_distinct());
        let mut acc = factory.create();
        for v in [1, 1, 2, 1] {
            acc.add(&[Datum::Int(v)]).unwrap();
        }
        assert_eq!(acc.finalize().unwrap(), Datum::Int(2));
    }
}
