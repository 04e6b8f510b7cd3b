//! Adapting foreign subscribe-shaped sources.
//!
//! A foreign source cannot be trusted to honor the notification grammar.
//! [`ExternalSink`] is the only handle it ever sees: it drops anything sent
//! after a terminal event or after the consumer went away, and it is backed
//! by an ordinary [`Subscriber`], so unsubscription flows through it exactly
//! as it does for native sources.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::StreamError;
use crate::observable::{IntoObservable, Observable};
use crate::subscriber::Subscriber;
use crate::subscription::Teardown;

/// A source implemented outside this crate.
pub trait ExternalSource<T> {
    /// Start delivering into `sink`; return the callback that stops delivery.
    fn subscribe(&self, sink: ExternalSink<T>) -> Box<dyn FnOnce()>;
}

/// The protocol guard handed to an [`ExternalSource`].
pub struct ExternalSink<T> {
    subscriber: Subscriber<T>,
    terminated: Rc<Cell<bool>>,
}

impl<T> Clone for ExternalSink<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            terminated: self.terminated.clone(),
        }
    }
}

impl<T: 'static> ExternalSink<T> {
    fn new(subscriber: Subscriber<T>) -> Self {
        Self {
            subscriber,
            terminated: Rc::new(Cell::new(false)),
        }
    }

    /// Whether further notifications will be dropped.
    pub fn is_closed(&self) -> bool {
        self.terminated.get() || self.subscriber.is_closed()
    }

    /// Deliver a value.
    pub fn next(&self, value: T) {
        if self.is_closed() {
            tracing::trace!("interop source sent a value after close");
            return;
        }
        self.subscriber.next(value);
    }

    /// Deliver the terminal error.
    pub fn error(&self, err: StreamError) {
        if self.terminated.replace(true) {
            tracing::trace!(error = %err, "interop source sent a second terminal event");
            return;
        }
        self.subscriber.error(err);
    }

    /// Deliver a failure described by the foreign source as
    /// [`StreamError::Interop`].
    pub fn fail(&self, reason: impl Into<String>) {
        self.error(StreamError::Interop(reason.into()));
    }

    /// Deliver the terminal completion.
    pub fn complete(&self) {
        if self.terminated.replace(true) {
            tracing::trace!("interop source sent a second terminal event");
            return;
        }
        self.subscriber.complete();
    }
}

/// Wrapper that makes any [`ExternalSource`] usable where an
/// [`IntoObservable`] is expected.
pub struct Interop<S>(pub S);

impl<T: 'static, S: ExternalSource<T> + 'static> IntoObservable<T> for Interop<S> {
    fn into_observable(self) -> Observable<T> {
        Observable::from_external(self.0)
    }
}

impl<T: 'static> Observable<T> {
    /// Adapt a foreign source.
    pub fn from_external(source: impl ExternalSource<T> + 'static) -> Self {
        let source = Rc::new(source);
        Observable::new(move |subscriber| {
            let stop = source.subscribe(ExternalSink::new(subscriber));
            Teardown::Action(stop)
        })
    }
}
