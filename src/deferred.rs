//! A promise-like single value.
//!
//! A [`Deferred`] settles at most once, either with a value or an error.
//! As an observable it emits the value and completes, or errors. Subscribers
//! arriving after settlement get the outcome through the context's
//! scheduler with zero delay.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::StreamError;
use crate::observable::{IntoObservable, Observable};
use crate::subscriber::Subscriber;
use crate::subscription::Teardown;

enum Settlement<T> {
    Pending(Vec<(u64, Subscriber<T>)>),
    Resolved(T),
    Rejected(StreamError),
}

struct Shared<T> {
    settlement: RefCell<Settlement<T>>,
    next_id: Cell<u64>,
}

/// A one-shot value that may not be known yet.
pub struct Deferred<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create a pending deferred.
    pub fn new() -> Self {
        Self::with(Settlement::Pending(Vec::new()))
    }

    /// Create a deferred already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with(Settlement::Resolved(value))
    }

    /// Create a deferred already rejected with `err`.
    pub fn rejected(err: StreamError) -> Self {
        Self::with(Settlement::Rejected(err))
    }

    fn with(settlement: Settlement<T>) -> Self {
        Self {
            shared: Rc::new(Shared {
                settlement: RefCell::new(settlement),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Whether the deferred has settled.
    pub fn is_settled(&self) -> bool {
        !matches!(&*self.shared.settlement.borrow(), Settlement::Pending(_))
    }

    /// Settle with a value. Ignored if already settled.
    pub fn resolve(&self, value: T) {
        for waiter in self.settle(Settlement::Resolved(value.clone())) {
            waiter.next(value.clone());
            waiter.complete();
        }
    }

    /// Settle with an error. Ignored if already settled.
    pub fn reject(&self, err: StreamError) {
        for waiter in self.settle(Settlement::Rejected(err.clone())) {
            waiter.error(err.clone());
        }
    }

    fn settle(&self, outcome: Settlement<T>) -> Vec<Subscriber<T>> {
        let mut settlement = self.shared.settlement.borrow_mut();
        match &mut *settlement {
            Settlement::Pending(waiters) => {
                let waiters = std::mem::take(waiters);
                *settlement = outcome;
                waiters.into_iter().map(|(_, s)| s).collect()
            }
            _ => {
                tracing::trace!("ignoring second settlement of deferred value");
                Vec::new()
            }
        }
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> IntoObservable<T> for Deferred<T> {
    fn into_observable(self) -> Observable<T> {
        let shared = self.shared;
        Observable::new(move |subscriber| {
            let id = shared.next_id.get();
            let outcome = match &mut *shared.settlement.borrow_mut() {
                Settlement::Pending(waiters) => {
                    shared.next_id.set(id + 1);
                    waiters.push((id, subscriber.clone()));
                    None
                }
                Settlement::Resolved(v) => Some(Ok(v.clone())),
                Settlement::Rejected(e) => Some(Err(e.clone())),
            };

            let Some(result) = outcome else {
                let shared = shared.clone();
                return Teardown::action(move || {
                    if let Settlement::Pending(waiters) = &mut *shared.settlement.borrow_mut() {
                        waiters.retain(|(waiter, _)| *waiter != id);
                    }
                });
            };

            let target = subscriber.clone();
            subscriber
                .context()
                .scheduler()
                .schedule(
                    0,
                    Box::new(move || match result {
                        Ok(v) => {
                            target.next(v);
                            target.complete();
                        }
                        Err(e) => target.error(e),
                    }),
                )
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use crate::Notification;

    #[test]
    fn test_pending_then_resolved() {
        let deferred = Deferred::new();
        let recorder = Recorder::new();
        deferred.clone().into_observable().subscribe(recorder.clone());
        assert!(recorder.notifications().is_empty());

        deferred.resolve(7);
        deferred.resolve(8);

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Next(7), Notification::Complete]
        );
    }

    #[test]
    fn test_late_subscriber_gets_settlement() {
        let deferred = Deferred::rejected(StreamError::source("nope"));
        let recorder = Recorder::<i32>::new();
        deferred.into_observable().subscribe(recorder.clone());

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Error(StreamError::source("nope"))]
        );
    }

    #[test]
    fn test_unsubscribed_waiter_is_dropped() {
        let deferred = Deferred::new();
        let recorder = Recorder::new();
        let sub = deferred.clone().into_observable().subscribe(recorder.clone());

        sub.unsubscribe();
        deferred.resolve(1);

        assert!(recorder.notifications().is_empty());
        assert!(deferred.is_settled());
    }
}
