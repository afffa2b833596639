use crate::cache::{CacheAside, CacheAsideBuilder};
use crate::error::BuildError;

use std::sync::OnceLock;

static SHARED: OnceLock<CacheAside> = OnceLock::new();

/// Build the process wide cache from `builder`, once.
///
/// Later calls return the cache built by the first successful call and ignore their builder.
/// A builder that fails validation leaves the cache unset.
pub fn init(builder: CacheAsideBuilder) -> Result<&'static CacheAside, BuildError> {
    if let Some(cache) = SHARED.get() {
        tracing::debug!("shared cache already initialized, ignoring options");
        return Ok(cache);
    }

    let cache = builder.build()?;

    // lost a race with another init, theirs wins and ours is dropped
    Ok(SHARED.get_or_init(|| cache))
}

/// The process wide cache, if [`init`] was called
pub fn get() -> Option<&'static CacheAside> {
    SHARED.get()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    // the only test touching the shared instance, tests in this crate run in one process
    #[test]
    fn test_init_once() {
        assert!(init(CacheAsideBuilder::new().batch_size(0)).is_err());
        assert!(get().is_none());

        let first = init(CacheAsideBuilder::new().miss_ttl(Duration::from_secs(5))).unwrap();
        let second = init(CacheAsideBuilder::new().miss_ttl(Duration::from_secs(10))).unwrap();

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.options().miss_ttl, Duration::from_secs(5));
        assert!(get().is_some());
    }
}
