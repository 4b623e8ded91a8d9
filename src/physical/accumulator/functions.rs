//! Aggregate function library
//!
//! All accumulators skip NULL arguments. Apart from COUNT and COUNT_ROWS,
//! which start at zero, an accumulator that saw no non-NULL input
//! finalizes to NULL.

use super::Accumulator;
use crate::error::{QueryError, Result};
use crate::types::Datum;
use ordered_float::OrderedFloat;
use bigdecimal::BigDecimal;
use std::cmp::Ordering;
use std::mem::size_of;

fn single<'a>(args: &'a [Datum], func: &str) -> Result<&'a Datum> {
    args.first()
        .ok_or_else(|| QueryError::Internal(format!("{} called without an argument", func)))
}

fn unexpected(func: &str, value: &Datum) -> QueryError {
    QueryError::Internal(format!("{} received unexpected argument {}", func, value))
}

/// Exact numeric view of an INT or DECIMAL argument
fn decimal_arg(value: &Datum, func: &str) -> Result<Option<BigDecimal>> {
    match value {
        Datum::Null => Ok(None),
        Datum::Int(v) => Ok(Some(BigDecimal::from(*v))),
        Datum::Decimal(v) => Ok(Some(v.clone())),
        other => Err(unexpected(func, other)),
    }
}

fn float_arg(value: &Datum, func: &str) -> Result<Option<f64>> {
    match value {
        Datum::Null => Ok(None),
        Datum::Float(v) => Ok(Some(v.0)),
        other => Err(unexpected(func, other)),
    }
}

fn decimal_size(value: &BigDecimal) -> usize {
    (value.digits() as usize / 19 + 1) * 8
}

/// COUNT: number of non-NULL arguments
#[derive(Debug, Default)]
pub struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if !single(args, "COUNT")?.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(Datum::Int(self.count))
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// COUNT_ROWS: number of qualifying rows
#[derive(Debug, Default)]
pub struct CountRowsAccumulator {
    count: i64,
}

impl Accumulator for CountRowsAccumulator {
    fn add(&mut self, _args: &[Datum]) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(Datum::Int(self.count))
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// ANY_NOT_NULL: first non-NULL argument seen
#[derive(Debug, Default)]
pub struct AnyNotNullAccumulator {
    value: Option<Datum>,
}

impl Accumulator for AnyNotNullAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if self.value.is_none() {
            let value = single(args, "ANY_NOT_NULL")?;
            if !value.is_null() {
                self.value = Some(value.clone());
            }
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.value.clone().unwrap_or(Datum::Null))
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.value.as_ref().map_or(0, |v| v.size())
    }
}

/// MIN / MAX over any ordered type
#[derive(Debug)]
pub struct MinMaxAccumulator {
    value: Option<Datum>,
    /// Ordering a new value must have against the current one to replace it
    replace_when: Ordering,
}

impl MinMaxAccumulator {
    pub fn min() -> Self {
        Self {
            value: None,
            replace_when: Ordering::Less,
        }
    }

    pub fn max() -> Self {
        Self {
            value: None,
            replace_when: Ordering::Greater,
        }
    }
}

impl Accumulator for MinMaxAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        let value = single(args, "MIN/MAX")?;
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.value {
            Some(current) => value.cmp(current) == self.replace_when,
            None => true,
        };
        if replace {
            self.value = Some(value.clone());
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.value.clone().unwrap_or(Datum::Null))
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.value.as_ref().map_or(0, |v| v.size())
    }
}

/// SUM over INT or DECIMAL, producing DECIMAL
#[derive(Debug, Default)]
pub struct DecimalSumAccumulator {
    sum: Option<BigDecimal>,
}

impl Accumulator for DecimalSumAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if let Some(v) = decimal_arg(single(args, "SUM")?, "SUM")? {
            self.sum = Some(match self.sum.take() {
                Some(sum) => sum + v,
                None => v,
            });
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self
            .sum
            .as_ref()
            .map_or(Datum::Null, |sum| Datum::Decimal(sum.clone())))
    }

    fn reset(&mut self) {
        self.sum = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.sum.as_ref().map_or(0, decimal_size)
    }
}

/// SUM over FLOAT
#[derive(Debug, Default)]
pub struct FloatSumAccumulator {
    sum: Option<f64>,
}

impl Accumulator for FloatSumAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if let Some(v) = float_arg(single(args, "SUM")?, "SUM")? {
            self.sum = Some(self.sum.unwrap_or(0.0) + v);
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.sum.map_or(Datum::Null, Datum::float))
    }

    fn reset(&mut self) {
        self.sum = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// SUM_INT: fixed-width integer sum that fails on overflow
#[derive(Debug, Default)]
pub struct IntSumAccumulator {
    sum: Option<i64>,
}

impl Accumulator for IntSumAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        match single(args, "SUM_INT")? {
            Datum::Null => {}
            Datum::Int(v) => {
                let sum = self.sum.unwrap_or(0);
                self.sum = Some(sum.checked_add(*v).ok_or_else(|| {
                    QueryError::Overflow("SUM_INT: integer out of range".to_string())
                })?);
            }
            other => return Err(unexpected("SUM_INT", other)),
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.sum.map_or(Datum::Null, Datum::Int))
    }

    fn reset(&mut self) {
        self.sum = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// AVG over INT or DECIMAL, producing DECIMAL
#[derive(Debug, Default)]
pub struct DecimalAvgAccumulator {
    sum: BigDecimal,
    count: i64,
}

impl Accumulator for DecimalAvgAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if let Some(v) = decimal_arg(single(args, "AVG")?, "AVG")? {
            self.sum += v;
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        if self.count == 0 {
            return Ok(Datum::Null);
        }
        let avg = &self.sum / &BigDecimal::from(self.count);
        Ok(Datum::Decimal(avg.normalized()))
    }

    fn reset(&mut self) {
        self.sum = BigDecimal::default();
        self.count = 0;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + decimal_size(&self.sum)
    }
}

/// AVG over FLOAT
#[derive(Debug, Default)]
pub struct FloatAvgAccumulator {
    sum: f64,
    count: i64,
}

impl Accumulator for FloatAvgAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if let Some(v) = float_arg(single(args, "AVG")?, "AVG")? {
            self.sum += v;
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        if self.count == 0 {
            return Ok(Datum::Null);
        }
        Ok(Datum::float(self.sum / self.count as f64))
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// Sample VARIANCE or STDDEV over INT or DECIMAL.
///
/// Keeps the count, sum and sum of squares exactly, so the variance
/// `(n * sum_sq - sum^2) / (n * (n - 1))` involves a single rounding step,
/// the final division.
#[derive(Debug)]
pub struct DecimalVarianceAccumulator {
    count: i64,
    sum: BigDecimal,
    sum_sq: BigDecimal,
    sqrt: bool,
}

impl DecimalVarianceAccumulator {
    pub fn variance() -> Self {
        Self {
            count: 0,
            sum: BigDecimal::default(),
            sum_sq: BigDecimal::default(),
            sqrt: false,
        }
    }

    pub fn stddev() -> Self {
        Self {
            sqrt: true,
            ..Self::variance()
        }
    }

    fn name(&self) -> &'static str {
        if self.sqrt {
            "STDDEV"
        } else {
            "VARIANCE"
        }
    }
}

impl Accumulator for DecimalVarianceAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        let name = self.name();
        let Some(x) = decimal_arg(single(args, name)?, name)? else {
            return Ok(());
        };
        self.sum_sq += &x * &x;
        self.sum += x;
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        if self.count < 2 {
            return Ok(Datum::Null);
        }
        let n = BigDecimal::from(self.count);
        let numerator = &n * &self.sum_sq - &self.sum * &self.sum;
        let variance = numerator / (&n * &BigDecimal::from(self.count - 1));
        let result = if self.sqrt {
            variance
                .sqrt()
                .ok_or_else(|| QueryError::Internal("STDDEV of negative variance".into()))?
        } else {
            variance
        };
        Ok(Datum::Decimal(result.normalized()))
    }

    fn reset(&mut self) {
        self.count = 0;
        self.sum = BigDecimal::default();
        self.sum_sq = BigDecimal::default();
    }

    fn size(&self) -> usize {
        size_of::<Self>() + decimal_size(&self.sum) + decimal_size(&self.sum_sq)
    }
}

/// Sample VARIANCE or STDDEV over FLOAT using Welford's algorithm
#[derive(Debug)]
pub struct FloatVarianceAccumulator {
    count: i64,
    mean: f64,
    sqr_diff: f64,
    sqrt: bool,
}

impl FloatVarianceAccumulator {
    pub fn variance() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sqr_diff: 0.0,
            sqrt: false,
        }
    }

    pub fn stddev() -> Self {
        Self {
            sqrt: true,
            ..Self::variance()
        }
    }
}

impl Accumulator for FloatVarianceAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        if let Some(x) = float_arg(single(args, "VARIANCE")?, "VARIANCE")? {
            self.count += 1;
            let delta = x - self.mean;
            self.mean += delta / self.count as f64;
            self.sqr_diff += delta * (x - self.mean);
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        if self.count < 2 {
            return Ok(Datum::Null);
        }
        let variance = self.sqr_diff / (self.count - 1) as f64;
        Ok(Datum::Float(OrderedFloat(if self.sqrt {
            variance.sqrt()
        } else {
            variance
        })))
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.sqr_diff = 0.0;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// XOR_AGG over INT
#[derive(Debug, Default)]
pub struct IntXorAccumulator {
    value: Option<i64>,
}

impl Accumulator for IntXorAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        match single(args, "XOR_AGG")? {
            Datum::Null => {}
            Datum::Int(v) => self.value = Some(self.value.unwrap_or(0) ^ v),
            other => return Err(unexpected("XOR_AGG", other)),
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.value.map_or(Datum::Null, Datum::Int))
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}

/// XOR_AGG over BYTES; every argument must have the same length
#[derive(Debug, Default)]
pub struct BytesXorAccumulator {
    value: Option<Vec<u8>>,
}

impl Accumulator for BytesXorAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        let bytes = match single(args, "XOR_AGG")? {
            Datum::Null => return Ok(()),
            Datum::Bytes(b) => b,
            other => return Err(unexpected("XOR_AGG", other)),
        };
        match &mut self.value {
            None => self.value = Some(bytes.clone()),
            Some(acc) => {
                if acc.len() != bytes.len() {
                    return Err(QueryError::InvalidArgument(format!(
                        "arguments to xor must all be the same length {} vs {}",
                        acc.len(),
                        bytes.len()
                    )));
                }
                for (a, b) in acc.iter_mut().zip(bytes) {
                    *a ^= b;
                }
            }
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.value.clone().map_or(Datum::Null, Datum::Bytes))
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.value.as_ref().map_or(0, |v| v.capacity())
    }
}

/// BOOL_AND / BOOL_OR
#[derive(Debug)]
pub struct BoolAccumulator {
    value: Option<bool>,
    conjunction: bool,
}

impl BoolAccumulator {
    pub fn and() -> Self {
        Self {
            value: None,
            conjunction: true,
        }
    }

    pub fn or() -> Self {
        Self {
            value: None,
            conjunction: false,
        }
    }
}

impl Accumulator for BoolAccumulator {
    fn add(&mut self, args: &[Datum]) -> Result<()> {
        match single(args, "BOOL_AND/BOOL_OR")? {
            Datum::Null => {}
            Datum::Bool(b) => {
                self.value = Some(match self.value {
                    None => *b,
                    Some(v) if self.conjunction => v && *b,
                    Some(v) => v || *b,
                });
            }
            other => return Err(unexpected("BOOL_AND/BOOL_OR", other)),
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Datum> {
        Ok(self.value.map_or(Datum::Null, Datum::Bool))
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn size(&self) -> usize {
        size_of::<Self>()
    }
}
