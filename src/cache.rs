mod builder;

pub use builder::{CacheAsideBuilder, Options};

use crate::batch::fetch_batches;
use crate::entry::{CacheEntry, FlightKey};
use crate::error::{BoxError, Error, PartialError};
use crate::flight::SingleFlight;
use crate::jitter::Jitter;
use crate::map::ExpiringMap;
use crate::store::ExpiringStore;

use std::any::type_name;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// A read through cache in front of a slower backing source.
///
/// Lookups are served from the store when possible. On a miss the value is fetched through the function
/// passed to the lookup, written back with a jittered ttl and returned. Keys the source confirms missing
/// are remembered too, for the shorter miss ttl, so they don't hit the source on every call.
///
/// Concurrent [`Self::get`] calls that miss on the same key share a single fetch.
///
/// Cloning is cheap, every clone shares the same store.
pub struct CacheAside<S = ExpiringMap<String, CacheEntry>> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    store: S,
    flights: SingleFlight<FlightKey, Result<CacheEntry, Error>>,
    jitter: Jitter,
    options: Options,
}

impl<S> Clone for CacheAside<S> {
    fn clone(&self) -> Self {
        CacheAside {
            inner: self.inner.clone(),
        }
    }
}

impl CacheAside {
    pub fn builder() -> CacheAsideBuilder {
        CacheAsideBuilder::new()
    }
}

impl<S> CacheAside<S> {
    pub(crate) fn from_parts(store: S, options: Options) -> Self {
        CacheAside {
            inner: Arc::new(Inner {
                store,
                flights: SingleFlight::new(),
                jitter: options.jitter_source(),
                options,
            }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// The underlying store, lookups on it bypass the cache aside logic entirely
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<S> CacheAside<S>
where
    S: ExpiringStore<CacheEntry>,
{
    /// Get the value for `key`, fetching it with `fetch` on a miss.
    ///
    /// `fetch` returns `Ok(None)` when the key does not exist in the source, which is cached and
    /// reported as [`Error::NotFound`]. Any `Err` is returned as [`Error::Fetch`] and nothing is cached.
    ///
    /// While a fetch for `key` is running, other calls for the same key and type wait for it instead
    /// of calling their own `fetch`.
    pub async fn get<V, F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, Error>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        if let Some(entry) = self.inner.store.get(key) {
            tracing::trace!(key, "cache hit");
            return entry.value(key);
        }

        let entry = self
            .inner
            .flights
            .run(FlightKey::new::<V>(key), move || self.load(key, fetch))
            .await?;

        entry.value(key)
    }

    // runs once per in-flight key
    async fn load<V, F, Fut, E>(&self, key: &str, fetch: F) -> Result<CacheEntry, Error>
    where
        V: Send + Sync + 'static,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Into<BoxError>,
    {
        // a call that finished just before we took over the key may have filled it already
        if let Some(entry) = self.inner.store.get(key) {
            return Ok(entry);
        }

        tracing::debug!(key, ty = type_name::<V>(), "cache miss, fetching");

        let entry = match fetch(key.to_owned()).await {
            Ok(Some(value)) => CacheEntry::found(value),
            Ok(None) => {
                tracing::debug!(key, "key not found in source, caching the miss");
                CacheEntry::Absent
            }
            Err(err) => {
                let err: BoxError = err.into();
                tracing::warn!(key, error = %err, "fetch failed");

                return Err(Error::fetch(err));
            }
        };

        self.put(key.to_owned(), entry.clone());

        Ok(entry)
    }

    /// Get the values for many keys at once, fetching every miss with `fetch`.
    ///
    /// Misses are split into batches of roughly `batch_size` keys and fetched concurrently, at most
    /// `max_concurrency` at a time. Keys missing from the map `fetch` returns are cached as not found
    /// and left out of the result, as are keys already cached as not found.
    ///
    /// If any batch fails nothing is cached and a [`PartialError`] is returned carrying whatever the
    /// other batches retrieved.
    pub async fn multi_get<K, V, F, Fut, E>(
        &self,
        keys: &[K],
        fetch: F,
    ) -> Result<HashMap<String, V>, PartialError<V>>
    where
        K: AsRef<str>,
        V: Clone + Send + Sync + 'static,
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, V>, E>>,
        E: Into<BoxError>,
    {
        let mut values = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        let mut seen = HashSet::with_capacity(keys.len());

        for key in keys {
            let key = key.as_ref();
            if !seen.insert(key) {
                continue;
            }

            match self.inner.store.get(key) {
                Some(CacheEntry::Absent) => {}
                Some(entry) => match entry.value::<V>(key) {
                    Ok(value) => {
                        values.insert(key.to_owned(), value);
                    }
                    Err(err) => return Err(PartialError::new(values, err)),
                },
                None => missing.push(key.to_owned()),
            }
        }

        if missing.is_empty() {
            tracing::trace!(keys = keys.len(), "multi get served from cache");
            return Ok(values);
        }

        tracing::debug!(
            keys = keys.len(),
            missing = missing.len(),
            ty = type_name::<V>(),
            "multi get cache miss, fetching"
        );

        let options = &self.inner.options;
        let (mut fetched, error) =
            fetch_batches(&missing, options.batch_size, options.max_concurrency, &fetch).await;

        if let Some(err) = error {
            // a failed batch says nothing about which keys exist, so nothing gets cached
            values.extend(
                missing
                    .into_iter()
                    .filter_map(|key| fetched.remove(&key).map(|value| (key, value))),
            );

            return Err(PartialError::new(values, err));
        }

        for key in missing {
            match fetched.remove(&key) {
                Some(value) => {
                    self.put(key.clone(), CacheEntry::found(value.clone()));
                    values.insert(key, value);
                }
                None => self.put(key, CacheEntry::Absent),
            }
        }

        Ok(values)
    }

    /// Remove keys from the cache.
    ///
    /// A fetch already running for one of the keys is not interrupted and will write its result back.
    pub fn delete<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for key in keys {
            self.inner.store.remove(key.as_ref());
        }
    }

    fn put(&self, key: String, entry: CacheEntry) {
        let nominal = if entry.is_absent() {
            self.inner.options.miss_ttl
        } else {
            self.inner.options.default_ttl
        };

        self.inner
            .store
            .set(key, entry, self.inner.jitter.around(nominal));
    }
}
