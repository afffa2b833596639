use super::Shards;

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Periodically drops expired entries from a map.
///
/// The thread only holds a weak reference to the shards, it exits once the owning map is dropped.
pub(crate) struct Sweeper {
    signal: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub(crate) fn spawn<K, V, S>(shards: Weak<Shards<K, V, S>>, interval: Duration) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
        S: BuildHasher + Send + Sync + 'static,
    {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = signal.clone();

        let handle = thread::spawn(move || {
            let (stopped, wake) = &*thread_signal;
            let mut stopped = stopped.lock();

            while !*stopped {
                wake.wait_for(&mut stopped, interval);
                if *stopped {
                    break;
                }

                let Some(shards) = shards.upgrade() else {
                    break;
                };

                MutexGuard::unlocked(&mut stopped, || {
                    shards.sweep();
                });
            }

            tracing::trace!("sweeper stopped");
        });

        Sweeper {
            signal,
            handle: Some(handle),
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let (stopped, wake) = &*self.signal;
        *stopped.lock() = true;
        wake.notify_one();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
