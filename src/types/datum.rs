//! Typed column values

use crate::types::ColumnType;
use ordered_float::OrderedFloat;
use bigdecimal::BigDecimal;
use std::fmt;

/// A single column value.
///
/// `Null` is a self-equal value so that rows can be grouped and deduplicated
/// with GROUP BY semantics. The derived ordering places `Null` first and only
/// orders values of the same variant meaningfully.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Decimal(BigDecimal),
    String(String),
    Bytes(Vec<u8>),
    Date(i32),      // days since epoch
    Timestamp(i64), // microseconds since epoch
}

/// A fixed-arity sequence of values
pub type Row = Vec<Datum>;

impl Datum {
    pub fn float(v: f64) -> Self {
        Datum::Float(OrderedFloat(v))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Type of a non-NULL value; `None` for NULL.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(ColumnType::Bool),
            Datum::Int(_) => Some(ColumnType::Int),
            Datum::Float(_) => Some(ColumnType::Float),
            Datum::Decimal(_) => Some(ColumnType::Decimal),
            Datum::String(_) => Some(ColumnType::String),
            Datum::Bytes(_) => Some(ColumnType::Bytes),
            Datum::Date(_) => Some(ColumnType::Date),
            Datum::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// NULL conforms to every column type.
    pub fn conforms_to(&self, ty: ColumnType) -> bool {
        self.column_type().map_or(true, |t| t == ty)
    }

    /// Approximate in-memory footprint, used for memory accounting.
    pub fn size(&self) -> usize {
        let heap = match self {
            Datum::String(s) => s.capacity(),
            Datum::Bytes(b) => b.capacity(),
            Datum::Decimal(d) => (d.digits() as usize / 19 + 1) * 8,
            _ => 0,
        };
        std::mem::size_of::<Datum>() + heap
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

impl From<BigDecimal> for Datum {
    fn from(v: BigDecimal) -> Self {
        Datum::Decimal(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Datum::Null, Into::into)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::Decimal(v) => write_decimal(f, v),
            Datum::String(v) => write!(f, "'{}'", v),
            Datum::Bytes(v) => {
                write!(f, "'\\x")?;
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "'")
            }
            Datum::Date(v) => write!(f, "DATE({})", v),
            Datum::Timestamp(v) => write!(f, "TIMESTAMP({})", v),
        }
    }
}

/// Plain positional notation with trailing zeros stripped.
fn write_decimal(f: &mut fmt::Formatter<'_>, value: &BigDecimal) -> fmt::Result {
    let (digits, scale) = value.normalized().into_bigint_and_exponent();
    let digits = digits.to_string();
    let (sign, magnitude) = match digits.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", digits.as_str()),
    };
    if scale <= 0 {
        let zeros = if magnitude == "0" { 0 } else { scale.unsigned_abs() as usize };
        return write!(f, "{}{}{}", sign, magnitude, "0".repeat(zeros));
    }
    let scale = scale as usize;
    if magnitude.len() > scale {
        let (int, frac) = magnitude.split_at(magnitude.len() - scale);
        write!(f, "{}{}.{}", sign, int, frac)
    } else {
        write!(f, "{}0.{}{}", sign, "0".repeat(scale - magnitude.len()), magnitude)
    }
}

/// Render a row as `[v0 v1 ...]`.
pub fn format_row(row: &[Datum]) -> String {
    let values: Vec<String> = row.iter().map(|d| d.to_string()).collect();
    format!("[{}]", values.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn hash_of(d: &Datum) -> u64 {
        let mut h = DefaultHasher::new();
        d.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_null_is_self_equal() {
        assert_eq!(Datum::Null, Datum::Null);
        assert_eq!(hash_of(&Datum::Null), hash_of(&Datum::Null));
        assert!(Datum::Null < Datum::Int(i64::MIN));
    }

    #[test]
    fn test_decimal_equality_ignores_scale() {
        let a = Datum::Decimal(dec("1.0"));
        let b = Datum::Decimal(dec("1.00"));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.to_string(), "1");
    }

    #[test]
    fn test_decimal_display_is_plain() {
        let cases = [
            ("5e29", "500000000000000000000000000000"),
            ("-2.50", "-2.5"),
            ("0.05", "0.05"),
            ("-0.000", "0"),
            ("120", "120"),
        ];
        for (input, expected) in cases {
            assert_eq!(Datum::Decimal(dec(input)).to_string(), expected, "{}", input);
        }
    }

    #[test]
    fn test_conforms_to() {
        assert!(Datum::Null.conforms_to(ColumnType::Int));
        assert!(Datum::Int(3).conforms_to(ColumnType::Int));
        assert!(!Datum::Int(3).conforms_to(ColumnType::Float));
    }

    #[test]
    fn test_format_row() {
        let row = vec![Datum::Int(1), Datum::Null, "a".into(), Datum::Bytes(vec![0x0f, 0xa0])];
        assert_eq!(format_row(&row), "[1 NULL 'a' '\\x0fa0']");
    }
}
