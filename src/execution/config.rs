//! Aggregator configuration

/// Default number of evicted buckets kept around for reuse
pub const DEFAULT_RECYCLE_LIMIT: usize = 16;

/// Tuning knobs for an aggregator instance
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Bytes of bucket state allowed to be live at once
    pub memory_limit: usize,
    /// Evicted buckets kept on a free list for reuse by new groups
    pub recycle_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self {
            memory_limit: usize::MAX,
            recycle_limit: DEFAULT_RECYCLE_LIMIT,
        }
    }

    /// Cap the memory held by live buckets
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set how many evicted buckets may be recycled; 0 disables recycling
    pub fn with_recycle_limit(mut self, buckets: usize) -> Self {
        self.recycle_limit = buckets;
        self
    }
}
