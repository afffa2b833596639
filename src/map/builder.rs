use super::{max_parallelism, ExpiringMap, Shard, Shards};
use super::sweeper::Sweeper;

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

pub struct MapBuilder {
    pub(crate) shards: Option<usize>,
    pub(crate) estimated_size: Option<usize>,
    pub(crate) sweep_interval: Option<Duration>,
}

impl MapBuilder {
    pub fn new() -> Self {
        MapBuilder {
            shards: None,
            estimated_size: None,
            sweep_interval: None,
        }
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn estimated_size(mut self, estimated_size: usize) -> Self {
        self.estimated_size = Some(estimated_size);
        self
    }

    /// Sweep expired entries on a background thread every `interval`.
    ///
    /// Without this expired entries are only dropped by calling [`ExpiringMap::sweep`].
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn build<K, V, S>(self, build_hasher: S) -> ExpiringMap<K, V, S>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: BuildHasher + Send + Sync + 'static,
    {
        let shards = self
            .shards
            .unwrap_or_else(|| max_parallelism() * 4)
            .max(1)
            .next_power_of_two();

        let per_shard = match self.estimated_size {
            Some(estimated_size) if estimated_size > shards => (estimated_size / shards) * 2,
            _ => 0,
        };

        let shards = Arc::new(Shards {
            build_hasher,
            shards: (0..shards).map(|_| Shard::new(per_shard)).collect(),
        });

        let sweeper = self
            .sweep_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| Sweeper::spawn(Arc::downgrade(&shards), interval));

        ExpiringMap {
            shards,
            _sweeper: sweeper,
        }
    }
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}
