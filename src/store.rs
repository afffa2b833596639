use crate::map::ExpiringMap;

use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

/// The key value store a [`crate::CacheAside`] reads from and writes back to.
///
/// Implementations must be safe to use from many threads at once and must treat an
/// entry past its ttl as absent. How and when expired entries are reclaimed is up to them.
pub trait ExpiringStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    fn set(&self, key: String, value: V, ttl: Duration);

    fn remove(&self, key: &str) -> Option<V>;
}

impl<V, S> ExpiringStore<V> for ExpiringMap<String, V, S>
where
    V: Clone + Send + Sync,
    S: BuildHasher + Send + Sync,
{
    #[inline]
    fn get(&self, key: &str) -> Option<V> {
        ExpiringMap::get(self, key)
    }

    #[inline]
    fn set(&self, key: String, value: V, ttl: Duration) {
        self.insert(key, value, ttl);
    }

    #[inline]
    fn remove(&self, key: &str) -> Option<V> {
        ExpiringMap::remove(self, key)
    }
}

impl<V, T> ExpiringStore<V> for Arc<T>
where
    T: ExpiringStore<V> + ?Sized,
{
    #[inline]
    fn get(&self, key: &str) -> Option<V> {
        (**self).get(key)
    }

    #[inline]
    fn set(&self, key: String, value: V, ttl: Duration) {
        (**self).set(key, value, ttl)
    }

    #[inline]
    fn remove(&self, key: &str) -> Option<V> {
        (**self).remove(key)
    }
}
