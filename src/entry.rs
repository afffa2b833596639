use crate::error::Error;

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// What the cache remembers about a key.
#[derive(Clone)]
pub enum CacheEntry {
    /// The value the backing source returned, stored type erased.
    Found(Arc<dyn Any + Send + Sync>),
    /// The backing source confirmed the key does not exist.
    Absent,
}

impl CacheEntry {
    pub fn found<V>(value: V) -> Self
    where
        V: Send + Sync + 'static,
    {
        CacheEntry::Found(Arc::new(value))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CacheEntry::Absent)
    }

    /// Read the entry back as a `V`.
    ///
    /// An absent entry is [`Error::NotFound`], a value of any other type is [`Error::TypeMismatch`].
    pub fn value<V>(&self, key: &str) -> Result<V, Error>
    where
        V: Clone + 'static,
    {
        match self {
            CacheEntry::Absent => Err(Error::NotFound),
            CacheEntry::Found(value) => {
                value
                    .downcast_ref::<V>()
                    .cloned()
                    .ok_or_else(|| Error::TypeMismatch {
                        key: key.to_owned(),
                        expected: type_name::<V>(),
                    })
            }
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEntry::Found(_) => f.write_str("Found(..)"),
            CacheEntry::Absent => f.write_str("Absent"),
        }
    }
}

/// Identifies an in-flight fetch.
///
/// The value type of the call site is part of the key, so two call sites reading the same key
/// as different types never share a fetch.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct FlightKey {
    type_id: TypeId,
    type_name: &'static str,
    key: String,
}

impl FlightKey {
    pub(crate) fn new<V: 'static>(key: &str) -> Self {
        FlightKey {
            type_id: TypeId::of::<V>(),
            type_name: type_name::<V>(),
            key: key.to_owned(),
        }
    }
}

impl fmt::Debug for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.key)
    }
}
