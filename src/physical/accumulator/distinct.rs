//! DISTINCT wrapper: forwards each argument tuple to the inner accumulator
//! only the first time it is seen in the group.

use super::Accumulator;
use crate::error::Result;
use crate::types::Datum;
use hashbrown::HashSet;
use std::mem::size_of;

#[derive(Debug)]
pub struct DistinctAccumulator {
    inner: Box<dyn Accumulator>,
    seen: HashSet<Vec<Datum>>,
    seen_bytes: usize,
}

impl DistinctAccumulator {
    pub fn new(inner: Box<dyn Accumulator>) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
            seen_bytes: 0,
        }
    }

    /// Number of distinct argument tuples recorded so far
    pub fn distinct_count(&self) -> usize {
        self.seen.len()
    }
}

impl Accumulator for DistinctAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        // Inner accumulators ignore NULL arguments; nothing to record.
        if args.iter().any(Datum::is_null) {
            return self.inner.add(args);
        }
        if self.seen.contains(args) {
            return Ok(());
        }
        self.inner.add(args)?;
        self.seen_bytes += args.iter().map(Datum::size).sum::<usize>() + size_of::<Vec<Datum>>();
        self.seen.insert(args.to_vec());
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        self.inner.finalize()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.seen.clear();
        self.seen_bytes = 0;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.inner.size() + self.seen_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::accumulator::{CountAccumulator, DecimalSumAccumulator};
    use bigdecimal::BigDecimal;

    #[test]
    fn test_sum_distinct() {
        let mut acc = DistinctAccumulator::new(Box::new(DecimalSumAccumulator::default()));
        for v in [2, 4, 2, 2, 4] {
            acc.add(&[Datum::Int(v)]).unwrap();
        }
        assert_eq!(acc.finalize().unwrap(), Datum::Decimal(BigDecimal::from(6)));
        assert_eq!(acc.distinct_count(), 2);
    }

    #[test]
    fn test_nulls_not_recorded() {
        let mut acc = DistinctAccumulator::new(Box::new(CountAccumulator::default()));
        acc.add(&[Datum::Null]).unwrap();
        acc.add(&[Datum::Int(1)]).unwrap();
        acc.add(&[Datum::Null]).unwrap();
        assert_eq!(acc.finalize().unwrap(), Datum::Int(1));
        assert_eq!(acc.distinct_count(), 1);
    }

    #[test]
    fn test_size_grows_with_new_values_only() {
        let mut acc = DistinctAccumulator::new(Box::new(CountAccumulator::default()));
        let empty = acc.size();
        acc.add(&[Datum::Int(1)]).unwrap();
        let one = acc.size();
        assert!(one > empty);
        acc.add(&[Datum::Int(1)]).unwrap();
        assert_eq!(acc.size(), one);
    }

    #[test]
    fn test_reset_forgets_seen_values() {
        let mut acc = DistinctAccumulator::new(Box::new(CountAccumulator::default()));
        acc.add(&[Datum::Int(1)]).unwrap();
        acc.reset();
        assert_eq!(acc.finalize().unwrap(), Datum::Int(0));
        acc.add(&[Datum::Int(1)]).unwrap();
        assert_eq!(acc.finalize().unwrap(), Datum::Int(1));
    }
}
