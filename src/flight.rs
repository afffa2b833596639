mod future;
mod waiters;

pub use future::Flight;

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::task::{Context, Poll};

use waiters::Waiters;

/// Deduplicates concurrent work by key.
///
/// While a call for a key is running, every other [`SingleFlight::run`] with the same key waits for it
/// and gets a clone of its output instead of running its own `init`. Once the call completes the key is
/// released, so the next call runs again.
pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Arc<Call<T>>>>,
}

/// The shared state of one running call.
#[doc(hidden)]
pub struct Call<T> {
    state: Mutex<CallState<T>>,
}

enum CallState<T> {
    Running(Waiters),
    Finished(T),
    // the leader was dropped before finishing, waiters need to start over
    Abandoned,
}

pub(crate) enum Role<T> {
    Leader(Arc<Call<T>>),
    Follower(Arc<Call<T>>),
}

impl<K, T> SingleFlight<K, T> {
    pub fn new() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// The number of keys with a call currently running
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
{
    /// Run `init` for `key` unless a call for `key` is already running, in which case wait for its output.
    ///
    /// If the task running `init` is dropped before it finishes, one of the waiting tasks takes over.
    pub fn run<F, Fut>(&self, key: K, init: F) -> Flight<'_, K, T, F, Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        Flight::Joining {
            group: self,
            key,
            init,
        }
    }

    pub(crate) fn join(&self, key: &K) -> Role<T> {
        let mut calls = self.calls.lock();

        if let Some(call) = calls.get(key) {
            return Role::Follower(call.clone());
        }

        let call = Arc::new(Call::running());
        calls.insert(key.clone(), call.clone());

        Role::Leader(call)
    }

    /// Release `key`, as long as it still belongs to `call`
    pub(crate) fn retire(&self, key: &K, call: &Arc<Call<T>>) {
        let mut calls = self.calls.lock();

        if calls.get(key).is_some_and(|c| Arc::ptr_eq(c, call)) {
            calls.remove(key);
        }
    }
}

impl<T> Call<T> {
    fn running() -> Self {
        Call {
            state: Mutex::new(CallState::Running(Waiters::new())),
        }
    }

    pub(crate) fn finish(&self, value: T) {
        self.settle(CallState::Finished(value));
    }

    pub(crate) fn abandon(&self) {
        self.settle(CallState::Abandoned);
    }

    fn settle(&self, next: CallState<T>) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);

        // wake outside of the lock
        if let CallState::Running(waiters) = prev {
            waiters.finish();
        }
    }

    /// `Ready(None)` means the leader gave up and the caller should join again
    pub(crate) fn poll_output(&self, cx: &mut Context<'_>, slot: &mut Option<usize>) -> Poll<Option<T>>
    where
        T: Clone,
    {
        let mut state = self.state.lock();

        match &mut *state {
            CallState::Running(waiters) => {
                waiters.join(cx.waker(), slot);
                Poll::Pending
            }
            CallState::Finished(value) => Poll::Ready(Some(value.clone())),
            CallState::Abandoned => Poll::Ready(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        match &*self.state.lock() {
            CallState::Running(waiters) => waiters.len(),
            _ => 0,
        }
    }
}
