//! Bucket store: live per-group accumulator state

use crate::error::{QueryError, Result};
use crate::execution::{MemoryReservation, SharedMemoryPool};
use crate::physical::accumulator::{Accumulator, AccumulatorFactory};
use crate::physical::group_key::GroupKey;
use crate::types::{Datum, Row};
use hashbrown::HashMap;
use std::mem::size_of;
use std::sync::Arc;
use tracing::trace;

/// Accumulators for one group, one per aggregation in spec order
#[derive(Debug)]
pub struct Bucket {
    accumulators: Vec<Box<dyn Accumulator>>,
    /// Bytes currently reserved for this bucket
    reserved: usize,
}

impl Bucket {
    fn new(factories: &[AccumulatorFactory]) -> Self {
        Self {
            accumulators: factories.iter().map(AccumulatorFactory::create).collect(),
            reserved: 0,
        }
    }

    /// Finalize every accumulator into an output row
    pub fn finalize(&self) -> Result<Row> {
        self.accumulators.iter().map(|a| a.finalize()).collect()
    }

    pub fn size(&self) -> usize {
        size_of::<Self>()
            + self
                .accumulators
                .iter()
                .map(|a| a.size() + size_of::<Box<dyn Accumulator>>())
                .sum::<usize>()
    }

    fn reset(&mut self) {
        for acc in &mut self.accumulators {
            acc.reset();
        }
        self.reserved = 0;
    }
}

/// Mutable access to a live bucket that keeps the memory reservation in
/// step with accumulator growth.
pub struct BucketMut<'a> {
    bucket: &'a mut Bucket,
    reservation: &'a mut MemoryReservation,
}

impl BucketMut<'_> {
    /// Feed `args` to the accumulator of aggregation `idx`.
    pub fn add(&mut self, idx: usize, args: &[Datum]) -> Result<()> {
        let acc = self.bucket.accumulators.get_mut(idx).ok_or_else(|| {
            QueryError::Internal(format!("aggregation index {} out of range", idx))
        })?;
        acc.add(args)
    }

    /// Reserve memory for any growth since the last call.
    pub fn account(&mut self) -> Result<()> {
        let size = self.bucket.size();
        if size > self.bucket.reserved {
            self.reservation.try_grow(size - self.bucket.reserved)?;
            self.bucket.reserved = size;
        }
        Ok(())
    }
}

/// Map from group key to bucket, with a side index from ordered-prefix value
/// to the keys sharing it so a whole prefix can be evicted without scanning.
#[derive(Debug)]
pub struct BucketStore {
    factories: Arc<[AccumulatorFactory]>,
    buckets: HashMap<GroupKey, Bucket>,
    prefix_len: usize,
    prefix_index: HashMap<Vec<Datum>, Vec<GroupKey>>,
    free: Vec<Bucket>,
    recycle_limit: usize,
    reservation: MemoryReservation,
    groups_created: u64,
    peak_live: usize,
}

impl BucketStore {
    pub fn new(
        factories: Arc<[AccumulatorFactory]>,
        prefix_len: usize,
        recycle_limit: usize,
        pool: SharedMemoryPool,
    ) -> Self {
        Self {
            factories,
            buckets: HashMap::new(),
            prefix_len,
            prefix_index: HashMap::new(),
            free: Vec::new(),
            recycle_limit,
            reservation: MemoryReservation::new(pool),
            groups_created: 0,
            peak_live: 0,
        }
    }

    /// Return the bucket for `key`, creating it in its identity state if
    /// this is the first row of the group.
    pub fn get_or_create(&mut self, key: &[Datum]) -> Result<BucketMut<'_>> {
        if !self.buckets.contains_key(key) {
            let mut bucket = self.free.pop().unwrap_or_else(|| Bucket::new(&self.factories));
            let owned = GroupKey::new(key.to_vec());
            let size = bucket.size() + owned.size();
            self.reservation.try_grow(size)?;
            bucket.reserved = size;

            if self.prefix_len > 0 {
                let prefix = owned.prefix(self.prefix_len);
                match self.prefix_index.get_mut(prefix) {
                    Some(keys) => keys.push(owned.clone()),
                    None => {
                        self.prefix_index.insert(prefix.to_vec(), vec![owned.clone()]);
                    }
                }
            }
            trace!(key = %owned, "created bucket");
            self.buckets.insert(owned, bucket);
            self.groups_created += 1;
            self.peak_live = self.peak_live.max(self.buckets.len());
        }

        let bucket = self
            .buckets
            .get_mut(key)
            .ok_or_else(|| QueryError::Internal("bucket vanished after insert".to_string()))?;
        Ok(BucketMut {
            bucket,
            reservation: &mut self.reservation,
        })
    }

    /// Remove and return the bucket for `key`.
    pub fn evict(&mut self, key: &[Datum]) -> Result<Bucket> {
        let (owned, bucket) = self.buckets.remove_entry(key).ok_or_else(|| {
            QueryError::Internal(format!(
                "no bucket to evict for key {}",
                crate::types::format_row(key)
            ))
        })?;
        if self.prefix_len > 0 {
            let prefix = owned.prefix(self.prefix_len);
            if let Some(keys) = self.prefix_index.get_mut(prefix) {
                keys.retain(|k| k != &owned);
                if keys.is_empty() {
                    self.prefix_index.remove(prefix);
                }
            }
        }
        self.reservation.shrink(bucket.reserved);
        Ok(bucket)
    }

    /// Remove and return every bucket whose key starts with `prefix`.
    pub fn evict_prefix(&mut self, prefix: &[Datum]) -> Result<Vec<Bucket>> {
        let keys = self.prefix_index.remove(prefix).unwrap_or_default();
        let mut evicted = Vec::with_capacity(keys.len());
        for key in keys {
            let bucket = self.buckets.remove(&key).ok_or_else(|| {
                QueryError::Internal(format!("prefix index references missing bucket {}", key))
            })?;
            self.reservation.shrink(bucket.reserved);
            evicted.push(bucket);
        }
        Ok(evicted)
    }

    /// Remove and return all remaining buckets, in key order so that output
    /// for earlier prefix values comes first.
    pub fn drain_all(&mut self) -> Vec<Bucket> {
        self.prefix_index.clear();
        let mut entries: Vec<(GroupKey, Bucket)> = self.buckets.drain().collect();
        let prefix_len = self.prefix_len;
        if prefix_len > 0 {
            entries.sort_by(|a, b| a.0.prefix(prefix_len).cmp(b.0.prefix(prefix_len)));
        }
        self.reservation.free();
        entries.into_iter().map(|(_, b)| b).collect()
    }

    /// Hand a finalized bucket back for reuse by a future group.
    pub fn recycle(&mut self, mut bucket: Bucket) {
        if self.free.len() < self.recycle_limit {
            bucket.reset();
            self.free.push(bucket);
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn groups_created(&self) -> u64 {
        self.groups_created
    }

    /// Largest number of buckets live at once
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Bytes currently reserved for live buckets
    pub fn reserved_bytes(&self) -> usize {
        self.reservation.size()
    }
}
