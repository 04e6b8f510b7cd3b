//! Lazy push-based sequences.
//!
//! An [`Observable`] is a description of how to produce a sequence: a
//! subscribe procedure invoked once per subscription with a fresh
//! [`Subscriber`]. Nothing runs until `subscribe` is called, and every call
//! is an independent execution. Values may arrive before `subscribe`
//! returns or later through the context's scheduler; the engine treats both
//! the same way.

use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::error::StreamError;
use crate::subscriber::{Observer, ObserverFns, Subscriber};
use crate::subscription::{Subscription, Teardown};

type SubscribeFn<T> = dyn Fn(Subscriber<T>) -> Teardown;

/// A lazy, repeatable, push-based sequence of `T`.
pub struct Observable<T> {
    subscribe_fn: Rc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: self.subscribe_fn.clone(),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T: 'static> Observable<T> {
    /// Build an observable from a subscribe procedure.
    ///
    /// The returned [`Teardown`] is attached to the subscriber and runs when
    /// the subscription ends for any reason.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rivulet::{Observable, Teardown};
    ///
    /// let ticks = Observable::new(|subscriber| {
    ///     for i in 0..3 {
    ///         if subscriber.is_closed() {
    ///             break;
    ///         }
    ///         subscriber.next(i);
    ///     }
    ///     subscriber.complete();
    ///     Teardown::empty()
    /// });
    /// # let _ = ticks;
    /// ```
    pub fn new(subscribe: impl Fn(Subscriber<T>) -> Teardown + 'static) -> Self {
        Self {
            subscribe_fn: Rc::new(subscribe),
        }
    }

    /// Subscribe under the default context.
    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        self.subscribe_with(observer, &Context::default())
    }

    /// Subscribe under the given context.
    pub fn subscribe_with(
        &self,
        observer: impl Observer<T> + 'static,
        context: &Context,
    ) -> Subscription {
        let subscriber = Subscriber::new(observer, context.clone());
        self.subscribe_subscriber(subscriber.clone());
        subscriber.subscription().clone()
    }

    /// Subscribe with only a value handler.
    ///
    /// Errors go to the context's unhandled error reporter.
    pub fn subscribe_next(&self, on_next: impl Fn(T) + 'static) -> Subscription {
        self.subscribe(ObserverFns::new().on_next(on_next))
    }

    /// Run the subscribe procedure against an existing subscriber.
    ///
    /// This is how operators subscribe to their sources.
    pub fn subscribe_subscriber(&self, subscriber: Subscriber<T>) {
        let teardown = (self.subscribe_fn)(subscriber.clone());
        subscriber.add(teardown);
    }

    /// Apply an operator.
    pub fn pipe<R>(self, operator: impl FnOnce(Observable<T>) -> Observable<R>) -> Observable<R> {
        operator(self)
    }

    /// Completes immediately.
    pub fn empty() -> Self {
        Self::new(|subscriber| {
            subscriber.complete();
            Teardown::empty()
        })
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Self::new(|_| Teardown::empty())
    }

    /// Errors immediately with `err`.
    pub fn throw(err: StreamError) -> Self {
        Self::new(move |subscriber| {
            subscriber.error(err.clone());
            Teardown::empty()
        })
    }

    /// Emits every item of `iterable`, then completes.
    ///
    /// The iterable is cloned per subscription and the loop stops as soon
    /// as the subscriber closes.
    pub fn from_iterable<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + 'static,
    {
        Self::new(move |subscriber| {
            for value in iterable.clone() {
                if subscriber.is_closed() {
                    return Teardown::empty();
                }
                subscriber.next(value);
            }
            subscriber.complete();
            Teardown::empty()
        })
    }

    /// Creates a fresh source per subscription.
    pub fn defer<O, F>(factory: F) -> Self
    where
        O: IntoObservable<T>,
        F: Fn() -> O + 'static,
    {
        Self::new(move |subscriber| {
            factory().into_observable().subscribe_subscriber(subscriber);
            Teardown::empty()
        })
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Emits `values` in order, then completes.
    pub fn of(values: Vec<T>) -> Self {
        Self::from_iterable(values)
    }

    /// Emits one value, then completes.
    pub fn just(value: T) -> Self {
        Self::of(vec![value])
    }

    /// Emits `value` after `delay` scheduler ticks, then completes.
    pub fn timer(delay: u64, value: T) -> Self {
        Self::new(move |subscriber| {
            let target = subscriber.clone();
            let value = value.clone();
            let pending = subscriber.context().scheduler().schedule(
                delay,
                Box::new(move || {
                    target.next(value);
                    target.complete();
                }),
            );
            pending.into()
        })
    }
}

/// Conversion into an [`Observable`].
///
/// Flattening projections and comparison targets accept anything that
/// implements this trait.
pub trait IntoObservable<T> {
    /// Convert into an observable.
    fn into_observable(self) -> Observable<T>;
}

impl<T> IntoObservable<T> for Observable<T> {
    fn into_observable(self) -> Observable<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use crate::Notification;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_of_emits_and_completes() {
        let recorder = Recorder::new();
        Observable::of(vec![1, 2, 3]).subscribe(recorder.clone());

        assert_eq!(
            recorder.notifications(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Next(3),
                Notification::Complete,
            ]
        );
    }

    #[test]
    fn test_each_subscription_is_independent() {
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let source = Observable::new(move |subscriber| {
            r.set(r.get() + 1);
            subscriber.next(r.get());
            subscriber.complete();
            Teardown::empty()
        });

        let first = Recorder::new();
        let second = Recorder::new();
        source.subscribe(first.clone());
        source.subscribe(second.clone());

        assert_eq!(runs.get(), 2);
        assert_eq!(first.values(), vec![1]);
        assert_eq!(second.values(), vec![2]);
    }

    #[test]
    fn test_teardown_runs_on_unsubscribe() {
        let torn = Rc::new(Cell::new(false));
        let t = torn.clone();
        let source: Observable<i32> = Observable::new(move |_| {
            let t = t.clone();
            Teardown::action(move || t.set(true))
        });

        let sub = source.subscribe(ObserverFns::new());
        assert!(!torn.get());
        sub.unsubscribe();
        assert!(torn.get());
    }

    #[test]
    fn test_throw_and_empty() {
        let failed = Recorder::new();
        Observable::<i32>::throw(StreamError::source("bad")).subscribe(failed.clone());
        assert_eq!(
            failed.notifications(),
            vec![Notification::Error(StreamError::source("bad"))]
        );

        let done = Recorder::new();
        Observable::<i32>::empty().subscribe(done.clone());
        assert_eq!(done.notifications(), vec![Notification::Complete]);
    }

    #[test]
    fn test_never_stays_open() {
        let recorder = Recorder::new();
        let sub = Observable::<i32>::never().subscribe(recorder.clone());
        assert!(recorder.notifications().is_empty());
        assert!(!sub.is_closed());
    }

    #[test]
    fn test_defer_runs_factory_per_subscription() {
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        let source = Observable::defer(move || {
            *c.borrow_mut() += 1;
            Observable::just(*c.borrow())
        });

        let recorder = Recorder::new();
        source.subscribe(recorder.clone());
        source.subscribe(recorder.clone());

        assert_eq!(recorder.values(), vec![1, 2]);
    }

    #[test]
    fn test_timer_with_immediate_scheduler() {
        let recorder = Recorder::new();
        Observable::timer(50, "done").subscribe(recorder.clone());
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Next("done"), Notification::Complete]
        );
    }
}
