use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The error type a fetch function may hand back.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::CacheAside`].
///
/// The type is cheap to clone, every caller waiting on the same in-flight fetch receives its own copy.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The backing source confirmed the key does not exist.
    ///
    /// This result is cached for the miss ttl.
    #[error("not found")]
    NotFound,
    /// The backing source failed. Never cached, the next call fetches again.
    #[error("fetch failed")]
    Fetch(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// A cached value is not of the type the caller asked for.
    #[error("cached value for key `{key}` is not a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

impl Error {
    pub fn fetch<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Fetch(Arc::from(err.into()))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

/// A multi key lookup that failed part way.
///
/// `values` holds everything that was retrieved before or despite the failure,
/// an error does not mean no data came back.
pub struct PartialError<V> {
    pub values: HashMap<String, V>,
    pub error: Error,
}

impl<V> PartialError<V> {
    pub fn new(values: HashMap<String, V>, error: Error) -> Self {
        PartialError { values, error }
    }

    pub fn into_parts(self) -> (HashMap<String, V>, Error) {
        (self.values, self.error)
    }
}

impl<V> fmt::Debug for PartialError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialError")
            .field("retrieved", &self.values.len())
            .field("error", &self.error)
            .finish()
    }
}

impl<V> fmt::Display for PartialError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after retrieving {} values)", self.error, self.values.len())
    }
}

impl<V> std::error::Error for PartialError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors that can occur when building a [`crate::CacheAside`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("batch size cannot be zero")]
    ZeroBatchSize,
    #[error("batch concurrency cannot be zero")]
    ZeroConcurrency,
    #[error("sweep interval cannot be zero")]
    ZeroSweepInterval,
    #[error("jitter spread must be within [0, 1), got {0}")]
    InvalidJitter(f64),
}
