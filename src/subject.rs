//! Multicast sources.
//!
//! A [`Subject`] is both an observer and a source: whatever it is fed is
//! broadcast to every current subscriber. Observers are snapshotted before
//! each broadcast, so subscribing or unsubscribing from inside a
//! notification affects only later notifications.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::StreamError;
use crate::observable::{IntoObservable, Observable};
use crate::subscriber::{Observer, Subscriber};
use crate::subscription::Teardown;

enum Terminal {
    Errored(StreamError),
    Completed,
}

struct SubjectState<T> {
    observers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
    terminal: Option<Terminal>,
}

/// Broadcasts notifications to all current subscribers.
pub struct Subject<T> {
    state: Rc<RefCell<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// Create a subject with no subscribers.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Broadcast a value.
    pub fn next(&self, value: T) {
        for subscriber in self.snapshot() {
            subscriber.next(value.clone());
        }
    }

    /// Broadcast an error and stop.
    pub fn error(&self, err: StreamError) {
        for subscriber in self.terminate(Terminal::Errored(err.clone())) {
            subscriber.error(err.clone());
        }
    }

    /// Broadcast completion and stop.
    pub fn complete(&self) {
        for subscriber in self.terminate(Terminal::Completed) {
            subscriber.complete();
        }
    }

    /// Number of current subscribers.
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Whether the subject has terminated.
    pub fn is_stopped(&self) -> bool {
        self.state.borrow().terminal.is_some()
    }

    /// The subject as a plain source.
    pub fn as_observable(&self) -> Observable<T> {
        let state = self.state.clone();
        Observable::new(move |subscriber| {
            let terminal = match &state.borrow().terminal {
                Some(Terminal::Errored(err)) => Some(Err(err.clone())),
                Some(Terminal::Completed) => Some(Ok(())),
                None => None,
            };
            match terminal {
                Some(Err(err)) => {
                    subscriber.error(err);
                    return Teardown::empty();
                }
                Some(Ok(())) => {
                    subscriber.complete();
                    return Teardown::empty();
                }
                None => {}
            }

            let id = {
                let mut state = state.borrow_mut();
                let id = state.next_id;
                state.next_id += 1;
                state.observers.push((id, subscriber.clone()));
                id
            };
            let state = state.clone();
            Teardown::action(move || {
                state.borrow_mut().observers.retain(|(other, _)| *other != id);
            })
        })
    }

    fn snapshot(&self) -> Vec<Subscriber<T>> {
        let state = self.state.borrow();
        if state.terminal.is_some() {
            return Vec::new();
        }
        state.observers.iter().map(|(_, s)| s.clone()).collect()
    }

    fn terminate(&self, terminal: Terminal) -> Vec<Subscriber<T>> {
        let mut state = self.state.borrow_mut();
        if state.terminal.is_some() {
            return Vec::new();
        }
        state.terminal = Some(terminal);
        std::mem::take(&mut state.observers)
            .into_iter()
            .map(|(_, s)| s)
            .collect()
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Observer<T> for Subject<T> {
    fn next(&self, value: T) {
        Subject::next(self, value)
    }

    fn error(&self, err: StreamError) {
        Subject::error(self, err)
    }

    fn complete(&self) {
        Subject::complete(self)
    }
}

impl<T: Clone + 'static> IntoObservable<T> for Subject<T> {
    fn into_observable(self) -> Observable<T> {
        self.as_observable()
    }
}

/// A [`Subject`] that remembers its latest value and replays it to each new
/// subscriber.
pub struct BehaviorSubject<T> {
    subject: Subject<T>,
    value: Rc<RefCell<T>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Clone + 'static> BehaviorSubject<T> {
    /// Create with an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            subject: Subject::new(),
            value: Rc::new(RefCell::new(initial)),
        }
    }

    /// The latest value.
    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store and broadcast a value.
    pub fn next(&self, value: T) {
        *self.value.borrow_mut() = value.clone();
        self.subject.next(value);
    }

    /// Broadcast an error and stop.
    pub fn error(&self, err: StreamError) {
        self.subject.error(err);
    }

    /// Broadcast completion and stop.
    pub fn complete(&self) {
        self.subject.complete();
    }

    /// The subject as a plain source.
    ///
    /// A subscriber is registered before the current value is replayed to
    /// it, so values pushed from inside that replay reach it as well.
    pub fn as_observable(&self) -> Observable<T> {
        let inner = self.subject.as_observable();
        let value = self.value.clone();
        Observable::new(move |subscriber| {
            inner.subscribe_subscriber(subscriber.clone());
            if !subscriber.is_closed() {
                let current = value.borrow().clone();
                subscriber.next(current);
            }
            Teardown::empty()
        })
    }
}

impl<T: Clone + 'static> IntoObservable<T> for BehaviorSubject<T> {
    fn into_observable(self) -> Observable<T> {
        self.as_observable()
    }
}
