use std::task::Waker;

/// Tasks parked on an in-flight call.
pub(crate) struct Waiters {
    wakers: Vec<Waker>,
}

impl Waiters {
    pub(crate) fn new() -> Self {
        Waiters { wakers: Vec::new() }
    }

    /// Register a waker in `slot`, pushing a new one only the first time a task joins.
    ///
    /// A task re-polled with a different waker overwrites its own slot.
    pub(crate) fn join(&mut self, waker: &Waker, slot: &mut Option<usize>) {
        match slot.and_then(|i| self.wakers.get_mut(i)) {
            Some(registered) => {
                if !registered.will_wake(waker) {
                    registered.clone_from(waker);
                }
            }
            None => {
                *slot = Some(self.wakers.len());
                self.wakers.push(waker.clone());
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }

    #[inline]
    pub(crate) fn finish(self) {
        for waker in self.wakers {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::task::noop_waker;

    #[test]
    fn test_repoll_reuses_slot() {
        let mut waiters = Waiters::new();
        let waker = noop_waker();

        let mut slot = None;
        for _ in 0..10 {
            waiters.join(&waker, &mut slot);
        }

        assert_eq!(slot, Some(0));
        assert_eq!(waiters.len(), 1);
    }

    #[test]
    fn test_each_task_gets_a_slot() {
        let mut waiters = Waiters::new();
        let waker = noop_waker();

        let mut slots = [None; 3];
        for slot in &mut slots {
            waiters.join(&waker, slot);
            waiters.join(&waker, slot);
        }

        assert_eq!(slots, [Some(0), Some(1), Some(2)]);
        assert_eq!(waiters.len(), 3);
    }
}
