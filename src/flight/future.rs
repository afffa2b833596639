use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use super::{Call, Role, SingleFlight};

#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project::pin_project(project = FlightProj, project_replace = FlightOwn)]
pub enum Flight<'a, K, T, F, Fut>
where
    K: Eq + Hash,
{
    Joining {
        group: &'a SingleFlight<K, T>,
        key: K,
        init: F,
    },
    Waiting {
        group: &'a SingleFlight<K, T>,
        key: K,
        init: F,
        call: Arc<Call<T>>,
        // our index in the call's waiters
        slot: Option<usize>,
    },
    Leading {
        ticket: Ticket<'a, K, T>,
        #[pin]
        fut: Fut,
    },
    Done,
}

/// Ownership of a key in the group while our `init` runs.
///
/// Dropping the ticket without settling it (the flight was dropped mid way or `init` panicked)
/// releases the key and tells the waiters to start over.
#[doc(hidden)]
pub struct Ticket<'a, K, T>
where
    K: Eq + Hash,
{
    group: &'a SingleFlight<K, T>,
    key: K,
    call: Arc<Call<T>>,
    settled: bool,
}

impl<'a, K, T> Ticket<'a, K, T>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
{
    fn settle(&mut self, value: T) {
        self.settled = true;
        // release the key first, anyone joining after this point starts a new call
        self.group.retire(&self.key, &self.call);
        self.call.finish(value);
    }
}

impl<'a, K, T> Drop for Ticket<'a, K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut calls = self.group.calls.lock();
        if calls.get(&self.key).is_some_and(|c| Arc::ptr_eq(c, &self.call)) {
            calls.remove(&self.key);
        }
        drop(calls);

        self.call.abandon();
    }
}

impl<'a, K, T, F, Fut> Future for Flight<'a, K, T, F, Fut>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project() {
                FlightProj::Joining { group, key, .. } => {
                    let role = group.join(key);

                    let FlightOwn::Joining { group, key, init } =
                        self.as_mut().project_replace(Flight::Done)
                    else {
                        unreachable!("we just matched on joining");
                    };

                    match role {
                        Role::Leader(call) => {
                            // build the ticket before calling init, if init panics the ticket releases the key
                            let ticket = Ticket {
                                group,
                                key,
                                call,
                                settled: false,
                            };
                            let fut = init();

                            self.set(Flight::Leading { ticket, fut });
                        }
                        Role::Follower(call) => {
                            tracing::debug!(key = ?key, "joining in-flight call");
                            self.set(Flight::Waiting {
                                group,
                                key,
                                init,
                                call,
                                slot: None,
                            });
                        }
                    }
                }
                FlightProj::Waiting { call, slot, .. } => match call.poll_output(cx, slot) {
                    Poll::Ready(Some(value)) => {
                        self.set(Flight::Done);
                        return Poll::Ready(value);
                    }
                    Poll::Ready(None) => {
                        let FlightOwn::Waiting {
                            group, key, init, ..
                        } = self.as_mut().project_replace(Flight::Done)
                        else {
                            unreachable!("we just matched on waiting");
                        };

                        tracing::trace!(key = ?key, "in-flight call was abandoned, joining again");
                        self.set(Flight::Joining { group, key, init });
                    }
                    Poll::Pending => return Poll::Pending,
                },
                FlightProj::Leading { ticket, fut } => {
                    let value = ready!(fut.poll(cx));
                    ticket.settle(value.clone());

                    self.set(Flight::Done);
                    return Poll::Ready(value);
                }
                FlightProj::Done => panic!("`Flight` polled after completion"),
            }
        }
    }
}
