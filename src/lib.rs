//! A concurrent cache aside layer for async rust.
//!
//! # Quick Start
//! Build a [`CacheAside`] and pass it a fetch function on every lookup. Misses are loaded through that function,
//! written back with a jittered ttl, and concurrent misses on the same key share one fetch.
//!
//! ```
//! use std::convert::Infallible;
//!
//! # async fn run() {
//! let cache = aside_cache::CacheAside::builder().build().unwrap();
//!
//! let name: String = cache
//!     .get("user:1", |_key| async { Ok::<_, Infallible>(Some("tom".to_string())) })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(name, "tom");
//! # }
//! ```

pub mod cache;
#[doc(inline)]
pub use cache::{CacheAside, CacheAsideBuilder, Options};

/// Splitting multi key misses into batches and fetching them concurrently.
pub mod batch;

pub mod entry;
#[doc(inline)]
pub use entry::CacheEntry;

pub mod error;
#[doc(inline)]
pub use error::{BoxError, BuildError, Error, PartialError};

/// Request coalescing, concurrent work for the same key runs once.
pub mod flight;
#[doc(inline)]
pub use flight::SingleFlight;

/// An optional process wide [`CacheAside`].
pub mod global;

pub mod jitter;
#[doc(inline)]
pub use jitter::Jitter;

/// The default store, a sharded map with per entry expiry. Designed for concurrent r/w.
pub mod map;
#[doc(inline)]
pub use map::ExpiringMap;

pub mod store;
#[doc(inline)]
pub use store::ExpiringStore;
