//! Group key codec
//!
//! A key is the projection of a row onto the grouping columns, laid out with
//! the ordered-prefix columns first. NULL is an ordinary key component, so
//! two rows with NULL in the same grouping column land in the same group.

use crate::types::Datum;
use std::borrow::Borrow;
use std::fmt;

/// Encoded group key
///
/// Hashes and compares exactly like the underlying `[Datum]` slice, so the
/// bucket store can be searched with a borrowed key buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupKey {
    values: Vec<Datum>,
}

impl GroupKey {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// The key of the global group, used when there are no grouping columns
    pub fn global() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    /// Leading `len` components, i.e. the ordered-prefix value of this key
    pub fn prefix(&self, len: usize) -> &[Datum] {
        &self.values[..len.min(self.values.len())]
    }

    pub fn size(&self) -> usize {
        std::mem::size_of::<Self>() + self.values.iter().map(Datum::size).sum::<usize>()
    }
}

impl Borrow<[Datum]> for GroupKey {
    fn borrow(&self) -> &[Datum] {
        &self.values
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::types::format_row(&self.values))
    }
}

/// Projects rows onto the grouping columns
#[derive(Debug, Clone)]
pub struct GroupKeyCodec {
    /// Ordered-prefix columns followed by the remaining grouping columns
    key_columns: Vec<usize>,
    prefix_len: usize,
}

impl GroupKeyCodec {
    /// `ordered_columns` must be a subset of `group_columns`; this is checked
    /// when the aggregator spec is validated.
    pub fn new(group_columns: &[usize], ordered_columns: &[usize]) -> Self {
        let mut key_columns = ordered_columns.to_vec();
        for &c in group_columns {
            if !key_columns.contains(&c) {
                key_columns.push(c);
            }
        }
        Self {
            key_columns,
            prefix_len: ordered_columns.len(),
        }
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    /// Number of leading key components that form the ordered prefix
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// True when every row maps to the global group
    pub fn is_global(&self) -> bool {
        self.key_columns.is_empty()
    }

    /// Write the key of `row` into `buf`, reusing its allocation.
    pub fn encode_into(&self, row: &[Datum], buf: &mut Vec<Datum>) {
        buf.clear();
        buf.extend(self.key_columns.iter().map(|&c| row[c].clone()));
    }

    pub fn encode(&self, row: &[Datum]) -> GroupKey {
        let mut values = Vec::with_capacity(self.key_columns.len());
        self.encode_into(row, &mut values);
        GroupKey::new(values)
    }

    /// Compare the ordered-prefix columns of `row` against `prefix` without
    /// building a key.
    pub fn prefix_matches(&self, row: &[Datum], prefix: &[Datum]) -> bool {
        prefix.len() == self.prefix_len
            && self.key_columns[..self.prefix_len]
                .iter()
                .zip(prefix)
                .all(|(&c, v)| &row[c] == v)
    }
}
