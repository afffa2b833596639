use crate::entry::CacheEntry;
use crate::error::BuildError;
use crate::jitter::Jitter;
use crate::map::builder::MapBuilder;
use crate::map::ExpiringMap;
use crate::store::ExpiringStore;

use super::CacheAside;

use hashbrown::hash_map::DefaultHashBuilder;
use std::time::Duration;

/// The knobs of a [`CacheAside`], fixed once it is built.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// Divisor used to split the misses of a multi key lookup into batches
    pub batch_size: usize,
    /// Nominal ttl of values found in the backing source
    pub default_ttl: Duration,
    /// Nominal ttl of keys the backing source confirmed missing
    pub miss_ttl: Duration,
    /// How often the default store drops expired entries
    pub sweep_interval: Duration,
    /// Relative spread applied to every ttl
    pub jitter: f64,
    /// Simultaneous batch fetches per multi key lookup
    pub max_concurrency: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            batch_size: 1000,
            default_ttl: Duration::from_secs(60 * 60 * 24 * 7),
            miss_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60 * 60),
            jitter: 0.05,
            max_concurrency: 10,
        }
    }
}

impl Options {
    pub(crate) fn jitter_source(&self) -> Jitter {
        Jitter::new(self.jitter)
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.batch_size == 0 {
            return Err(BuildError::ZeroBatchSize);
        }

        if self.max_concurrency == 0 {
            return Err(BuildError::ZeroConcurrency);
        }

        if self.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }

        if !(0.0..1.0).contains(&self.jitter) {
            return Err(BuildError::InvalidJitter(self.jitter));
        }

        Ok(())
    }
}

/// Builds a [`CacheAside`].
///
/// ```
/// use std::time::Duration;
///
/// let cache = aside_cache::CacheAsideBuilder::new()
///     .default_ttl(Duration::from_secs(60 * 60))
///     .miss_ttl(Duration::from_secs(30))
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.options().miss_ttl, Duration::from_secs(30));
/// ```
#[derive(Clone, Debug, Default)]
pub struct CacheAsideBuilder {
    options: Options,
    shards: Option<usize>,
    estimated_size: Option<usize>,
}

impl CacheAsideBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: Options) -> Self {
        CacheAsideBuilder {
            options,
            ..Default::default()
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.options.batch_size = batch_size;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.options.default_ttl = ttl;
        self
    }

    pub fn miss_ttl(mut self, ttl: Duration) -> Self {
        self.options.miss_ttl = ttl;
        self
    }

    /// Only applies to the default store, see [`Self::build_with_store`]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.options.sweep_interval = interval;
        self
    }

    pub fn jitter(mut self, spread: f64) -> Self {
        self.options.jitter = spread;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.options.max_concurrency = max_concurrency;
        self
    }

    /// Shard count of the default store, rounded up to a power of two
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Capacity hint for the default store
    pub fn estimated_size(mut self, estimated_size: usize) -> Self {
        self.estimated_size = Some(estimated_size);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Build a cache backed by an [`ExpiringMap`] swept every `sweep_interval`
    pub fn build(self) -> Result<CacheAside, BuildError> {
        self.options.validate()?;

        let mut map = MapBuilder::new().sweep_interval(self.options.sweep_interval);
        if let Some(shards) = self.shards {
            map = map.shards(shards);
        }
        if let Some(estimated_size) = self.estimated_size {
            map = map.estimated_size(estimated_size);
        }

        let store: ExpiringMap<String, CacheEntry> = map.build(DefaultHashBuilder::default());

        Ok(CacheAside::from_parts(store, self.options))
    }

    /// Build a cache on top of an existing store
    pub fn build_with_store<S>(self, store: S) -> Result<CacheAside<S>, BuildError>
    where
        S: ExpiringStore<CacheEntry>,
    {
        self.options.validate()?;

        Ok(CacheAside::from_parts(store, self.options))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();

        assert_eq!(options.batch_size, 1000);
        assert_eq!(options.default_ttl, Duration::from_secs(7 * 24 * 60 * 60));
        assert_eq!(options.miss_ttl, Duration::from_secs(60));
        assert_eq!(options.sweep_interval, Duration::from_secs(60 * 60));
        assert_eq!(options.jitter, 0.05);
        assert_eq!(options.max_concurrency, 10);
    }

    #[test]
    fn test_setters_are_applied() {
        let cache = CacheAsideBuilder::new()
            .batch_size(100)
            .default_ttl(Duration::from_secs(3 * 24 * 60 * 60))
            .miss_ttl(Duration::from_secs(2 * 60))
            .sweep_interval(Duration::from_secs(2 * 60 * 60))
            .max_concurrency(4)
            .jitter(0.1)
            .shards(2)
            .build()
            .unwrap();

        let options = cache.options();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.default_ttl, Duration::from_secs(3 * 24 * 60 * 60));
        assert_eq!(options.miss_ttl, Duration::from_secs(2 * 60));
        assert_eq!(options.sweep_interval, Duration::from_secs(2 * 60 * 60));
        assert_eq!(options.max_concurrency, 4);
        assert_eq!(options.jitter, 0.1);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert_eq!(
            CacheAsideBuilder::new().batch_size(0).build().err(),
            Some(BuildError::ZeroBatchSize)
        );
        assert_eq!(
            CacheAsideBuilder::new().max_concurrency(0).build().err(),
            Some(BuildError::ZeroConcurrency)
        );
        assert_eq!(
            CacheAsideBuilder::new().sweep_interval(Duration::ZERO).build().err(),
            Some(BuildError::ZeroSweepInterval)
        );
        assert_eq!(
            CacheAsideBuilder::new().jitter(1.5).build().err(),
            Some(BuildError::InvalidJitter(1.5))
        );
        assert_eq!(
            CacheAsideBuilder::new().jitter(-0.1).build().err(),
            Some(BuildError::InvalidJitter(-0.1))
        );
    }

    #[test]
    fn test_from_options_round_trips() {
        let options = Options {
            batch_size: 7,
            ..Default::default()
        };

        assert_eq!(CacheAsideBuilder::from_options(options.clone()).options(), &options);
    }
}
