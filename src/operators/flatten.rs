//! The flattening engine behind `exhaust_map`, `merge_map`, `switch_map`
//! and `concat_map`.
//!
//! Every outer value is projected to an inner observable; a
//! [`FlattenPolicy`] decides what happens when an outer value arrives while
//! inners are still running:
//!
//! ```text
//! Exhaust  drop the value
//! Merge    subscribe if under the limit, else buffer the value
//! Concat   merge with a limit of one, drained in arrival order
//! Switch   cancel the running inner, then subscribe the new one
//! ```
//!
//! Inner values go straight downstream. An error from either side is fatal.
//! The result completes once the outer has completed and no inner is active
//! or buffered.
//!
//! Inner subscribers are children of the result subscriber, not of the outer
//! one, so the outer completing never cancels a running inner while
//! unsubscribing the result cancels everything.
//!
//! The active count is raised *before* the projection and the inner
//! subscribe run. An outer value pushed synchronously from inside an inner's
//! subscribe procedure therefore sees the inner as already active: exhaust
//! drops it, merge and concat buffer it once the limit is reached.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::StreamResult;
use crate::observable::{IntoObservable, Observable};
use crate::subscriber::{OperatorSubscriber, Subscriber};
use crate::subscription::{Subscription, Teardown};

/// How a flattening operator treats outer values while inners are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenPolicy {
    /// Ignore outer values while an inner is active
    Exhaust,
    /// Run up to `concurrency` inners at once, buffering the rest.
    ///
    /// `None` falls back to the context's default concurrency, then to
    /// unbounded.
    Merge {
        /// Maximum number of concurrently active inners
        concurrency: Option<usize>,
    },
    /// Cancel the active inner in favor of the newest one
    Switch,
    /// Run inners one at a time in arrival order
    Concat,
}

impl FlattenPolicy {
    fn limit(self, fallback: Option<usize>) -> usize {
        match self {
            FlattenPolicy::Exhaust | FlattenPolicy::Switch | FlattenPolicy::Concat => 1,
            FlattenPolicy::Merge { concurrency } => {
                concurrency.or(fallback).unwrap_or(usize::MAX).max(1)
            }
        }
    }
}

type Projection<T, R> = dyn Fn(T) -> StreamResult<Observable<R>>;

struct FlattenState<T> {
    active: usize,
    outer_completed: bool,
    buffer: VecDeque<T>,
    current: Option<(u64, Subscription)>,
    inner_count: u64,
    draining: bool,
}

struct FlattenEngine<T, R> {
    policy: FlattenPolicy,
    limit: usize,
    project: Rc<Projection<T, R>>,
    destination: Subscriber<R>,
    state: RefCell<FlattenState<T>>,
}

impl<T: 'static, R: 'static> FlattenEngine<T, R> {
    fn on_outer_next(self: &Rc<Self>, value: T) {
        match self.policy {
            FlattenPolicy::Exhaust => {
                if self.state.borrow().active > 0 {
                    tracing::trace!("inner still active, dropping outer value");
                    return;
                }
            }
            FlattenPolicy::Switch => {
                let previous = {
                    let mut state = self.state.borrow_mut();
                    let previous = state.current.take();
                    if previous.is_some() {
                        state.active -= 1;
                    }
                    previous
                };
                if let Some((id, inner)) = previous {
                    tracing::trace!(inner = id, "switching away from active inner");
                    inner.unsubscribe();
                }
            }
            FlattenPolicy::Merge { .. } | FlattenPolicy::Concat => {
                let mut state = self.state.borrow_mut();
                if state.active >= self.limit || !state.buffer.is_empty() {
                    state.buffer.push_back(value);
                    tracing::trace!(buffered = state.buffer.len(), "concurrency limit reached");
                    return;
                }
            }
        }
        self.subscribe_inner(value);
    }

    fn subscribe_inner(self: &Rc<Self>, value: T) {
        if self.destination.is_closed() {
            return;
        }
        let id = {
            let mut state = self.state.borrow_mut();
            state.active += 1;
            state.inner_count += 1;
            state.inner_count
        };

        let inner = match (self.project)(value) {
            Ok(inner) => inner,
            Err(err) => {
                self.destination.error(err);
                return;
            }
        };

        let engine = Rc::clone(self);
        let subscriber = OperatorSubscriber::new(&self.destination, |dest, v| dest.next(v))
            .on_complete(move |_| engine.on_inner_complete(id))
            .build();
        if self.policy == FlattenPolicy::Switch {
            self.state.borrow_mut().current = Some((id, subscriber.subscription().clone()));
        }
        inner.subscribe_subscriber(subscriber);
    }

    fn on_inner_complete(self: &Rc<Self>, id: u64) {
        {
            let mut state = self.state.borrow_mut();
            if self.policy == FlattenPolicy::Switch {
                let is_current = matches!(&state.current, Some((current, _)) if *current == id);
                if !is_current {
                    return;
                }
                state.current = None;
            }
            state.active -= 1;
            if state.draining {
                return;
            }
        }
        self.drain();
        self.check_complete();
    }

    fn on_outer_complete(&self) {
        self.state.borrow_mut().outer_completed = true;
        self.check_complete();
    }

    /// Start buffered values while slots are free.
    ///
    /// Inners that complete synchronously inside the loop only release their
    /// slot; the loop itself picks up the next value, so the stack stays flat
    /// however long the buffer is.
    fn drain(self: &Rc<Self>) {
        self.state.borrow_mut().draining = true;
        while !self.destination.is_closed() {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.active < self.limit {
                    state.buffer.pop_front()
                } else {
                    None
                }
            };
            match next {
                Some(value) => self.subscribe_inner(value),
                None => break,
            }
        }
        self.state.borrow_mut().draining = false;
    }

    fn check_complete(&self) {
        let done = {
            let state = self.state.borrow();
            state.outer_completed && state.active == 0 && state.buffer.is_empty()
        };
        if done && !self.destination.is_closed() {
            tracing::debug!(policy = ?self.policy, "outer and all inners completed");
            self.destination.complete();
        }
    }
}

fn flatten<T: 'static, R: 'static>(
    source: Observable<T>,
    policy: FlattenPolicy,
    project: Rc<Projection<T, R>>,
) -> Observable<R> {
    Observable::new(move |destination: Subscriber<R>| {
        let limit = policy.limit(destination.context().config().default_concurrency);
        let engine = Rc::new(FlattenEngine {
            policy,
            limit,
            project: project.clone(),
            destination: destination.clone(),
            state: RefCell::new(FlattenState {
                active: 0,
                outer_completed: false,
                buffer: VecDeque::new(),
                current: None,
                inner_count: 0,
                draining: false,
            }),
        });

        let on_next = engine.clone();
        let outer = OperatorSubscriber::new(&destination, move |_, value| on_next.on_outer_next(value))
            .on_complete(move |_| engine.on_outer_complete())
            .build();
        source.subscribe_subscriber(outer);
        Teardown::empty()
    })
}

impl<T: 'static> Observable<T> {
    /// Flatten with an explicit policy and a fallible projection.
    ///
    /// An `Err` from the projection terminates the result with that error.
    pub fn flatten_with<R, O, F>(self, policy: FlattenPolicy, project: F) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
        F: Fn(T) -> StreamResult<O> + 'static,
    {
        flatten(
            self,
            policy,
            Rc::new(move |value: T| -> StreamResult<Observable<R>> {
                project(value).map(IntoObservable::into_observable)
            }),
        )
    }

    /// Project each value to an inner source, ignoring values that arrive
    /// while an inner is still active.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rivulet::Observable;
    /// use rivulet::testing::Recorder;
    ///
    /// let recorder = Recorder::new();
    /// Observable::of(vec![1, 2, 3])
    ///     .exhaust_map(|v| Observable::of(vec![v, v * 10]))
    ///     .subscribe(recorder.clone());
    /// assert_eq!(recorder.values(), vec![1, 10, 2, 20, 3, 30]);
    /// ```
    pub fn exhaust_map<R, O>(self, project: impl Fn(T) -> O + 'static) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Exhaust, move |value| Ok(project(value)))
    }

    /// [`exhaust_map`](Self::exhaust_map) with a fallible projection.
    pub fn try_exhaust_map<R, O>(
        self,
        project: impl Fn(T) -> StreamResult<O> + 'static,
    ) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Exhaust, project)
    }

    /// Project each value to an inner source and run all inners concurrently.
    ///
    /// The limit comes from the context's default concurrency, if any.
    pub fn merge_map<R, O>(self, project: impl Fn(T) -> O + 'static) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Merge { concurrency: None }, move |value| {
            Ok(project(value))
        })
    }

    /// [`merge_map`](Self::merge_map) with at most `concurrency` active
    /// inners. A limit of zero is treated as one.
    pub fn merge_map_with_concurrency<R, O>(
        self,
        project: impl Fn(T) -> O + 'static,
        concurrency: usize,
    ) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(
            FlattenPolicy::Merge {
                concurrency: Some(concurrency),
            },
            move |value| Ok(project(value)),
        )
    }

    /// [`merge_map`](Self::merge_map) with a fallible projection.
    pub fn try_merge_map<R, O>(
        self,
        project: impl Fn(T) -> StreamResult<O> + 'static,
    ) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Merge { concurrency: None }, project)
    }

    /// Project each value to an inner source, cancelling the previous inner.
    pub fn switch_map<R, O>(self, project: impl Fn(T) -> O + 'static) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Switch, move |value| Ok(project(value)))
    }

    /// [`switch_map`](Self::switch_map) with a fallible projection.
    pub fn try_switch_map<R, O>(
        self,
        project: impl Fn(T) -> StreamResult<O> + 'static,
    ) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Switch, project)
    }

    /// Project each value to an inner source and run the inners one after
    /// another.
    pub fn concat_map<R, O>(self, project: impl Fn(T) -> O + 'static) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Concat, move |value| Ok(project(value)))
    }

    /// [`concat_map`](Self::concat_map) with a fallible projection.
    pub fn try_concat_map<R, O>(
        self,
        project: impl Fn(T) -> StreamResult<O> + 'static,
    ) -> Observable<R>
    where
        R: 'static,
        O: IntoObservable<R>,
    {
        self.flatten_with(FlattenPolicy::Concat, project)
    }
}

impl<R: 'static> Observable<Observable<R>> {
    /// Flatten inner sources, ignoring those that arrive while one is active.
    pub fn exhaust_all(self) -> Observable<R> {
        self.exhaust_map(|inner| inner)
    }

    /// Flatten inner sources concurrently.
    pub fn merge_all(self) -> Observable<R> {
        self.merge_map(|inner| inner)
    }

    /// Flatten inner sources, always following the newest.
    pub fn switch_all(self) -> Observable<R> {
        self.switch_map(|inner| inner)
    }

    /// Flatten inner sources one after another.
    pub fn concat_all(self) -> Observable<R> {
        self.concat_map(|inner| inner)
    }
}
