//! Observers and the protocol-enforcing [`Subscriber`].
//!
//! Every subscription creates one `Subscriber` around the consumer. The
//! subscriber enforces the `next* (error | complete)?` grammar: anything
//! after a terminal event, or after disposal, is dropped. A terminal event
//! disposes the subscriber's teardown tree exactly once.
//!
//! Observer methods take `&self` so a notification can re-enter the same
//! observer while an earlier one is still on the stack; implementations
//! keep their state in cells and never hold a borrow across a downstream
//! call.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::config::Config;
use crate::context::Context;
use crate::error::StreamError;
use crate::subscription::{Subscription, Teardown, TeardownKey};

/// Consumer of a stream's notifications.
pub trait Observer<T> {
    /// Receive a value.
    fn next(&self, value: T);

    /// Receive the terminal error.
    fn error(&self, err: StreamError);

    /// Receive the terminal completion.
    fn complete(&self);

    /// Whether this observer handles errors itself.
    ///
    /// When `false`, the subscriber routes errors to the context's
    /// [`ErrorReporter`](crate::ErrorReporter) instead.
    fn handles_errors(&self) -> bool {
        true
    }
}

impl<T, O: Observer<T> + ?Sized> Observer<T> for Rc<O> {
    fn next(&self, value: T) {
        (**self).next(value)
    }

    fn error(&self, err: StreamError) {
        (**self).error(err)
    }

    fn complete(&self) {
        (**self).complete()
    }

    fn handles_errors(&self) -> bool {
        (**self).handles_errors()
    }
}

/// An observer assembled from optional closures.
///
/// # Example
///
/// ```rust
/// use rivulet::{Observable, ObserverFns};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let s = seen.clone();
/// Observable::of(vec![1, 2, 3]).subscribe(ObserverFns::new().on_next(move |v| s.borrow_mut().push(v)));
/// assert_eq!(*seen.borrow(), vec![1, 2, 3]);
/// ```
pub struct ObserverFns<T> {
    on_next: Option<Box<dyn Fn(T)>>,
    on_error: Option<Box<dyn Fn(StreamError)>>,
    on_complete: Option<Box<dyn Fn()>>,
}

impl<T> ObserverFns<T> {
    /// An observer that ignores everything and has no error handler.
    pub fn new() -> Self {
        Self {
            on_next: None,
            on_error: None,
            on_complete: None,
        }
    }

    /// Set the value handler.
    pub fn on_next(mut self, f: impl Fn(T) + 'static) -> Self {
        self.on_next = Some(Box::new(f));
        self
    }

    /// Set the error handler.
    pub fn on_error(mut self, f: impl Fn(StreamError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Set the completion handler.
    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl<T> Default for ObserverFns<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observer<T> for ObserverFns<T> {
    fn next(&self, value: T) {
        if let Some(f) = &self.on_next {
            f(value);
        }
    }

    fn error(&self, err: StreamError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }

    fn complete(&self) {
        if let Some(f) = &self.on_complete {
            f();
        }
    }

    fn handles_errors(&self) -> bool {
        self.on_error.is_some()
    }
}

struct SubscriberInner<T> {
    destination: Box<dyn Observer<T>>,
    stopped: Cell<bool>,
    subscription: Subscription,
    context: Context,
}

/// The protocol-enforcing observer handed to a subscribe procedure.
///
/// Cloning yields another handle to the same subscriber.
pub struct Subscriber<T> {
    inner: Rc<SubscriberInner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// Wrap `destination` in a fresh subscriber with its own subscription.
    pub fn new(destination: impl Observer<T> + 'static, context: Context) -> Self {
        Self {
            inner: Rc::new(SubscriberInner {
                destination: Box::new(destination),
                stopped: Cell::new(false),
                subscription: Subscription::new(),
                context,
            }),
        }
    }

    /// Whether this subscriber still accepts notifications.
    ///
    /// Producers looping synchronously should check this before every
    /// emission.
    pub fn is_closed(&self) -> bool {
        self.inner.stopped.get() || self.inner.subscription.is_closed()
    }

    /// Forward a value unless closed.
    pub fn next(&self, value: T) {
        if self.is_closed() {
            tracing::trace!("dropping value delivered after close");
            return;
        }
        self.log_notification("next");
        self.inner.destination.next(value);
    }

    /// Forward the terminal error and dispose.
    pub fn error(&self, err: StreamError) {
        if self.is_closed() {
            tracing::trace!(error = %err, "dropping error delivered after close");
            return;
        }
        self.inner.stopped.set(true);
        self.log_notification("error");
        if self.inner.destination.handles_errors() {
            self.inner.destination.error(err);
        } else {
            self.inner.context.report_unhandled(&err);
        }
        self.inner.subscription.unsubscribe();
    }

    /// Forward completion and dispose.
    pub fn complete(&self) {
        if self.is_closed() {
            tracing::trace!("dropping completion delivered after close");
            return;
        }
        self.inner.stopped.set(true);
        self.log_notification("complete");
        self.inner.destination.complete();
        self.inner.subscription.unsubscribe();
    }

    /// Attach a teardown to this subscriber's subscription.
    pub fn add(&self, teardown: Teardown) -> Option<TeardownKey> {
        self.inner.subscription.add(teardown)
    }

    /// Dispose without delivering a terminal event.
    pub fn unsubscribe(&self) {
        self.inner.stopped.set(true);
        self.inner.subscription.unsubscribe();
    }

    /// The subscription owning this subscriber's teardowns.
    pub fn subscription(&self) -> &Subscription {
        &self.inner.subscription
    }

    /// The context this subscriber runs under.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    fn log_notification(&self, kind: &'static str) {
        let config = self.inner.context.config();
        if config.is_verbose() {
            tracing::trace!(context = config.name(), kind, "notification");
        }
    }
}

impl<T: 'static> Observer<T> for Subscriber<T> {
    fn next(&self, value: T) {
        Subscriber::next(self, value)
    }

    fn error(&self, err: StreamError) {
        Subscriber::error(self, err)
    }

    fn complete(&self) {
        Subscriber::complete(self)
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("stopped", &self.inner.stopped.get())
            .field("subscription", &self.inner.subscription)
            .finish()
    }
}

type NextFn<T, R> = Box<dyn Fn(&Subscriber<R>, T)>;
type ErrorFn<R> = Box<dyn Fn(&Subscriber<R>, StreamError)>;
type CompleteFn<R> = Box<dyn Fn(&Subscriber<R>)>;

struct OperatorObserver<T, R> {
    destination: Subscriber<R>,
    on_next: NextFn<T, R>,
    on_error: Option<ErrorFn<R>>,
    on_complete: Option<CompleteFn<R>>,
}

impl<T, R: 'static> Observer<T> for OperatorObserver<T, R> {
    fn next(&self, value: T) {
        (self.on_next)(&self.destination, value);
    }

    fn error(&self, err: StreamError) {
        match &self.on_error {
            Some(f) => f(&self.destination, err),
            None => self.destination.error(err),
        }
    }

    fn complete(&self) {
        match &self.on_complete {
            Some(f) => f(&self.destination),
            None => self.destination.complete(),
        }
    }
}

/// Builds the upstream-facing subscriber of an operator.
///
/// Errors and completion are forwarded to the destination unless
/// overridden. The built subscriber is attached as a child of the
/// destination, so disposing the destination disposes it too.
///
/// # Example
///
/// ```rust
/// use rivulet::{Observable, OperatorSubscriber, Teardown};
///
/// fn doubled(source: Observable<i32>) -> Observable<i32> {
///     Observable::new(move |destination| {
///         let upstream = OperatorSubscriber::new(&destination, |dest, v: i32| dest.next(v * 2)).build();
///         source.subscribe_subscriber(upstream);
///         Teardown::empty()
///     })
/// }
/// # let _ = doubled(Observable::of(vec![1]));
/// ```
pub struct OperatorSubscriber<T, R> {
    observer: OperatorObserver<T, R>,
}

impl<T: 'static, R: 'static> OperatorSubscriber<T, R> {
    /// Start building with the value handler.
    pub fn new(
        destination: &Subscriber<R>,
        on_next: impl Fn(&Subscriber<R>, T) + 'static,
    ) -> Self {
        Self {
            observer: OperatorObserver {
                destination: destination.clone(),
                on_next: Box::new(on_next),
                on_error: None,
                on_complete: None,
            },
        }
    }

    /// Override error handling.
    pub fn on_error(mut self, f: impl Fn(&Subscriber<R>, StreamError) + 'static) -> Self {
        self.observer.on_error = Some(Box::new(f));
        self
    }

    /// Override completion handling.
    pub fn on_complete(mut self, f: impl Fn(&Subscriber<R>) + 'static) -> Self {
        self.observer.on_complete = Some(Box::new(f));
        self
    }

    /// Create the subscriber and attach it under the destination.
    pub fn build(self) -> Subscriber<T> {
        let destination = self.observer.destination.clone();
        let subscriber = Subscriber::new(self.observer, destination.context().clone());
        destination.add(subscriber.subscription().clone().into());
        subscriber
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CollectingReporter;
    use std::cell::RefCell;

    fn recording() -> (Rc<RefCell<Vec<String>>>, ObserverFns<i32>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (n, e, c) = (log.clone(), log.clone(), log.clone());
        let observer = ObserverFns::new()
            .on_next(move |v| n.borrow_mut().push(format!("next {v}")))
            .on_error(move |err| e.borrow_mut().push(format!("error {err}")))
            .on_complete(move || c.borrow_mut().push("complete".to_string()));
        (log, observer)
    }

    #[test]
    fn test_nothing_after_complete() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer, Context::default());

        subscriber.next(1);
        subscriber.complete();
        subscriber.next(2);
        subscriber.error(StreamError::source("late"));
        subscriber.complete();

        assert_eq!(*log.borrow(), vec!["next 1", "complete"]);
        assert!(subscriber.is_closed());
    }

    #[test]
    fn test_error_disposes_teardowns_once() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer, Context::default());
        let disposed = Rc::new(Cell::new(0));
        let d = disposed.clone();
        subscriber.add(Teardown::action(move || d.set(d.get() + 1)));

        subscriber.error(StreamError::source("boom"));
        subscriber.unsubscribe();

        assert_eq!(*log.borrow(), vec!["error boom"]);
        assert_eq!(disposed.get(), 1);
    }

    #[test]
    fn test_unsubscribe_closes() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer, Context::default());

        subscriber.unsubscribe();
        subscriber.next(1);

        assert!(log.borrow().is_empty());
        assert!(subscriber.is_closed());
    }

    #[test]
    fn test_late_teardown_runs_immediately() {
        let subscriber = Subscriber::new(ObserverFns::<i32>::new(), Context::default());
        subscriber.complete();

        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        subscriber.add(Teardown::action(move || r.set(true)));

        assert!(ran.get());
    }

    #[test]
    fn test_missing_error_handler_reports() {
        let reporter = CollectingReporter::new();
        let ctx = Context::default().with_reporter(reporter.clone());
        let subscriber = Subscriber::new(ObserverFns::<i32>::new(), ctx);

        subscriber.error(StreamError::source("nobody listens"));

        assert_eq!(reporter.errors(), vec![StreamError::source("nobody listens")]);
    }

    #[test]
    fn test_operator_subscriber_is_child_of_destination() {
        let (log, observer) = recording();
        let destination = Subscriber::new(observer, Context::default());
        let upstream = OperatorSubscriber::new(&destination, |dest, v: i32| dest.next(v + 1)).build();

        upstream.next(1);
        destination.unsubscribe();

        assert!(upstream.is_closed());
        assert_eq!(*log.borrow(), vec!["next 2"]);
    }
}
