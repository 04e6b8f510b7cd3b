//! Deterministic virtual time and marble diagrams.
//!
//! [`TestScheduler`] keeps a queue of work ordered by due time, with ties
//! broken by scheduling order, and only advances when told to. Marble
//! strings describe sources and expectations one frame per character:
//!
//! | char        | meaning                                        |
//! |-------------|------------------------------------------------|
//! | `-`         | one frame passes                               |
//! | `a`..       | a value (any other character)                  |
//! | `|`         | completion                                     |
//! | `#`         | an error, `StreamError::source("error")`      |
//! | `(ab)`      | events sharing the frame where the group opens |
//! | `^`         | subscription point (hot sources, subscriptions)|
//! | `!`         | unsubscription point (subscriptions)           |
//! | space       | ignored                                        |
//!
//! A group still takes one frame per character, parentheses included.
//!
//! # Example
//!
//! ```rust
//! use rivulet::testing::{parse_marbles, TestScheduler};
//!
//! let scheduler = TestScheduler::new();
//! let source = scheduler.cold("--a--b|");
//! let recorder = scheduler.record(&source.observable().map(|c| c.to_ascii_uppercase()));
//! scheduler.flush();
//!
//! assert_eq!(recorder.timeline(), parse_marbles("--A--B|"));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{Context, Scheduler};
use crate::error::StreamError;
use crate::notification::Notification;
use crate::observable::{IntoObservable, Observable};
use crate::subject::Subject;
use crate::subscriber::{Observer, Subscriber};
use crate::subscription::{Subscription, Teardown};

type Work = Box<dyn FnOnce()>;

struct Clock {
    now: Cell<u64>,
    seq: Cell<u64>,
    queue: RefCell<BTreeMap<(u64, u64), Work>>,
}

/// A virtual-time [`Scheduler`] driven explicitly by tests.
#[derive(Clone)]
pub struct TestScheduler {
    clock: Rc<Clock>,
}

impl TestScheduler {
    /// Create a scheduler at time zero with nothing queued.
    pub fn new() -> Self {
        Self {
            clock: Rc::new(Clock {
                now: Cell::new(0),
                seq: Cell::new(0),
                queue: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// A default context whose scheduler is this one.
    pub fn context(&self) -> Context {
        Context::default().with_scheduler(self.clone())
    }

    /// Number of queued work items.
    pub fn pending(&self) -> usize {
        self.clock.queue.borrow().len()
    }

    /// Run queued work, including work queued while flushing, until the
    /// queue is empty.
    pub fn flush(&self) {
        while self.run_next(u64::MAX) {}
    }

    /// Run all work due at or before `time`, then move the clock to `time`.
    pub fn advance_to(&self, time: u64) {
        while self.run_next(time) {}
        if time > self.clock.now.get() {
            self.clock.now.set(time);
        }
    }

    fn run_next(&self, limit: u64) -> bool {
        let next = {
            let mut queue = self.clock.queue.borrow_mut();
            match queue.keys().next().copied() {
                Some(key) if key.0 <= limit => queue.remove(&key).map(|work| (key.0, work)),
                _ => None,
            }
        };
        match next {
            Some((time, work)) => {
                self.clock.now.set(time);
                work();
                true
            }
            None => false,
        }
    }

    /// A cold source: every subscription replays `marbles` from its own
    /// subscription time.
    pub fn cold(&self, marbles: &str) -> TestObservable<char> {
        self.cold_with(marbles, |c| c)
    }

    /// Like [`cold`](Self::cold), mapping each value character with `f`.
    pub fn cold_with<T: Clone + 'static>(
        &self,
        marbles: &str,
        f: impl Fn(char) -> T,
    ) -> TestObservable<T> {
        let events = Rc::new(parse_marbles_with(marbles, f));
        let logs = Rc::new(RefCell::new(Vec::new()));
        let scheduler = self.clone();
        let log = logs.clone();
        let observable = Observable::new(move |subscriber: Subscriber<T>| {
            let index = open_log(&log, scheduler.now());
            for (frame, event) in events.iter() {
                let target = subscriber.clone();
                let event = event.clone();
                let pending = scheduler.schedule(*frame, Box::new(move || event.accept(&target)));
                subscriber.add(pending.into());
            }
            close_log(&log, index, &scheduler)
        });
        TestObservable { observable, logs }
    }

    /// A hot source: events are scheduled now, relative to the `^` marker
    /// (or the first frame if there is none), whether or not anyone is
    /// subscribed. Events before `^` are dropped.
    pub fn hot(&self, marbles: &str) -> TestObservable<char> {
        self.hot_with(marbles, |c| c)
    }

    /// Like [`hot`](Self::hot), mapping each value character with `f`.
    pub fn hot_with<T: Clone + 'static>(
        &self,
        marbles: &str,
        f: impl Fn(char) -> T,
    ) -> TestObservable<T> {
        let subject = Subject::<T>::new();
        for (frame, event) in parse_marbles_with(marbles, f) {
            let target = subject.clone();
            self.schedule(frame, Box::new(move || event.accept(&target)));
        }

        let logs = Rc::new(RefCell::new(Vec::new()));
        let scheduler = self.clone();
        let log = logs.clone();
        let source = subject.as_observable();
        let observable = Observable::new(move |subscriber: Subscriber<T>| {
            let index = open_log(&log, scheduler.now());
            source.subscribe_subscriber(subscriber);
            close_log(&log, index, &scheduler)
        });
        TestObservable { observable, logs }
    }

    /// A recorder that stamps notifications with this scheduler's time.
    pub fn recorder<T>(&self) -> Recorder<T> {
        Recorder {
            events: Rc::new(RefCell::new(Vec::new())),
            clock: Some(Rc::downgrade(&self.clock)),
        }
    }

    /// Subscribe to `observable` under [`context`](Self::context) and record
    /// what it emits.
    pub fn record<T: 'static>(&self, observable: &Observable<T>) -> Recorder<T> {
        let recorder = self.recorder();
        observable.subscribe_with(recorder.clone(), &self.context());
        recorder
    }

    /// Like [`record`](Self::record), unsubscribing at `time`.
    pub fn record_until<T: 'static>(&self, observable: &Observable<T>, time: u64) -> Recorder<T> {
        let recorder = self.recorder();
        let subscription = observable.subscribe_with(recorder.clone(), &self.context());
        let delay = time.saturating_sub(self.now());
        self.schedule(delay, Box::new(move || subscription.unsubscribe()));
        recorder
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> u64 {
        self.clock.now.get()
    }

    fn schedule(&self, delay: u64, work: Work) -> Subscription {
        let seq = self.clock.seq.get();
        self.clock.seq.set(seq + 1);
        let key = (self.clock.now.get().saturating_add(delay), seq);

        let handle = Subscription::new();
        let clock = Rc::downgrade(&self.clock);
        handle.add_action(move || {
            if let Some(clock) = clock.upgrade() {
                let cancelled = clock.queue.borrow_mut().remove(&key);
                drop(cancelled);
            }
        });

        let done = handle.clone();
        self.clock.queue.borrow_mut().insert(
            key,
            Box::new(move || {
                done.unsubscribe();
                work();
            }),
        );
        handle
    }
}

impl fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScheduler")
            .field("now", &self.clock.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

/// When a subscription to a test source started and ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionLog {
    /// Time of subscription.
    pub subscribed: u64,
    /// Time of unsubscription, if it has happened.
    pub unsubscribed: Option<u64>,
}

/// A marble-driven source that logs its subscriptions.
pub struct TestObservable<T> {
    observable: Observable<T>,
    logs: Rc<RefCell<Vec<SubscriptionLog>>>,
}

impl<T> Clone for TestObservable<T> {
    fn clone(&self) -> Self {
        Self {
            observable: self.observable.clone(),
            logs: self.logs.clone(),
        }
    }
}

impl<T> TestObservable<T> {
    /// The source itself.
    pub fn observable(&self) -> Observable<T> {
        self.observable.clone()
    }

    /// Every subscription made so far, in order.
    pub fn subscriptions(&self) -> Vec<SubscriptionLog> {
        self.logs.borrow().clone()
    }
}

impl<T> IntoObservable<T> for TestObservable<T> {
    fn into_observable(self) -> Observable<T> {
        self.observable
    }
}

fn open_log(logs: &Rc<RefCell<Vec<SubscriptionLog>>>, now: u64) -> usize {
    let mut logs = logs.borrow_mut();
    logs.push(SubscriptionLog {
        subscribed: now,
        unsubscribed: None,
    });
    logs.len() - 1
}

fn close_log(
    logs: &Rc<RefCell<Vec<SubscriptionLog>>>,
    index: usize,
    scheduler: &TestScheduler,
) -> Teardown {
    let logs = logs.clone();
    let clock = Rc::downgrade(&scheduler.clock);
    Teardown::action(move || {
        let now = clock.upgrade().map(|c| c.now.get()).unwrap_or_default();
        if let Some(entry) = logs.borrow_mut().get_mut(index) {
            entry.unsubscribed.get_or_insert(now);
        }
    })
}

/// Records notifications, with virtual timestamps when created through
/// [`TestScheduler::recorder`].
pub struct Recorder<T> {
    events: Rc<RefCell<Vec<(u64, Notification<T>)>>>,
    clock: Option<Weak<Clock>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<T> Recorder<T> {
    /// A recorder without a clock; every entry is stamped zero.
    pub fn new() -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
            clock: None,
        }
    }

    fn push(&self, notification: Notification<T>) {
        let now = self
            .clock
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|c| c.now.get())
            .unwrap_or_default();
        self.events.borrow_mut().push((now, notification));
    }
}

impl<T: Clone> Recorder<T> {
    /// Everything received, in order.
    pub fn notifications(&self) -> Vec<Notification<T>> {
        self.events.borrow().iter().map(|(_, n)| n.clone()).collect()
    }

    /// Only the values received.
    pub fn values(&self) -> Vec<T> {
        self.events
            .borrow()
            .iter()
            .filter_map(|(_, n)| n.value().cloned())
            .collect()
    }

    /// Everything received, with the time it arrived.
    pub fn timeline(&self) -> Vec<(u64, Notification<T>)> {
        self.events.borrow().clone()
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observer<T> for Recorder<T> {
    fn next(&self, value: T) {
        self.push(Notification::Next(value));
    }

    fn error(&self, err: StreamError) {
        self.push(Notification::Error(err));
    }

    fn complete(&self) {
        self.push(Notification::Complete);
    }
}

fn parse(marbles: &str) -> (Option<u64>, Vec<(u64, Notification<char>)>) {
    let mut frame = 0u64;
    let mut group: Option<u64> = None;
    let mut origin = None;
    let mut events = Vec::new();
    for c in marbles.chars() {
        let at = group.unwrap_or(frame);
        match c {
            ' ' => continue,
            '-' => {}
            '(' => group = Some(frame),
            ')' => group = None,
            '^' => origin = Some(at),
            '|' => events.push((at, Notification::Complete)),
            '#' => events.push((at, Notification::Error(StreamError::source("error")))),
            value => events.push((at, Notification::Next(value))),
        }
        frame += 1;
    }
    (origin, events)
}

/// Parse an event marble string into timed notifications.
///
/// Times are measured from `^` when present; earlier events are dropped.
pub fn parse_marbles(marbles: &str) -> Vec<(u64, Notification<char>)> {
    parse_marbles_with(marbles, |c| c)
}

/// Like [`parse_marbles`], mapping each value character with `f`.
pub fn parse_marbles_with<T>(marbles: &str, f: impl Fn(char) -> T) -> Vec<(u64, Notification<T>)> {
    let (origin, events) = parse(marbles);
    let origin = origin.unwrap_or(0);
    events
        .into_iter()
        .filter(|(at, _)| *at >= origin)
        .map(|(at, event)| (at - origin, event.map(&f)))
        .collect()
}

/// Parse a subscription marble string such as `"--^---!"`.
pub fn parse_subscription(marbles: &str) -> SubscriptionLog {
    let mut frame = 0u64;
    let mut group: Option<u64> = None;
    let mut subscribed = 0;
    let mut unsubscribed = None;
    for c in marbles.chars() {
        let at = group.unwrap_or(frame);
        match c {
            ' ' => continue,
            '(' => group = Some(frame),
            ')' => group = None,
            '^' => subscribed = at,
            '!' => unsubscribed = Some(at),
            _ => {}
        }
        frame += 1;
    }
    SubscriptionLog {
        subscribed,
        unsubscribed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups_and_spaces() {
        assert_eq!(
            parse_marbles(" -a-(bc)-| "),
            vec![
                (1, Notification::Next('a')),
                (3, Notification::Next('b')),
                (3, Notification::Next('c')),
                (8, Notification::Complete),
            ]
        );
        assert_eq!(
            parse_marbles("--#"),
            vec![(2, Notification::Error(StreamError::source("error")))]
        );
    }

    #[test]
    fn test_parse_hot_origin() {
        assert_eq!(
            parse_marbles("-a-^-b|"),
            vec![(2, Notification::Next('b')), (3, Notification::Complete)]
        );
    }

    #[test]
    fn test_parse_subscription() {
        assert_eq!(
            parse_subscription("  --^---!"),
            SubscriptionLog {
                subscribed: 2,
                unsubscribed: Some(6)
            }
        );
        assert_eq!(
            parse_subscription("^"),
            SubscriptionLog {
                subscribed: 0,
                unsubscribed: None
            }
        );
    }

    #[test]
    fn test_scheduler_orders_by_time_then_fifo() {
        let scheduler = TestScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (delay, label) in [(5, "late"), (1, "first"), (1, "second")] {
            let order = order.clone();
            scheduler.schedule(delay, Box::new(move || order.borrow_mut().push(label)));
        }

        scheduler.advance_to(1);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(scheduler.now(), 1);

        scheduler.flush();
        assert_eq!(*order.borrow(), vec!["first", "second", "late"]);
        assert_eq!(scheduler.now(), 5);
    }

    #[test]
    fn test_cancelled_work_does_not_run() {
        let scheduler = TestScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let handle = scheduler.schedule(3, Box::new(move || r.set(true)));

        assert_eq!(scheduler.pending(), 1);
        handle.unsubscribe();
        assert_eq!(scheduler.pending(), 0);
        scheduler.flush();
        assert!(!ran.get());
    }

    #[test]
    fn test_cold_logs_subscriptions() {
        let scheduler = TestScheduler::new();
        let source = scheduler.cold("-a-b|");
        let recorder = scheduler.record(&source.observable());
        scheduler.flush();

        assert_eq!(recorder.timeline(), parse_marbles("-a-b|"));
        assert_eq!(source.subscriptions(), vec![parse_subscription("^---!")]);
    }

    #[test]
    fn test_hot_misses_early_values() {
        let scheduler = TestScheduler::new();
        let source = scheduler.hot("-a-b-c|");
        scheduler.advance_to(2);
        let recorder = scheduler.record(&source.observable());
        scheduler.flush();

        assert_eq!(recorder.values(), vec!['b', 'c']);
        assert_eq!(source.subscriptions(), vec![parse_subscription("--^---!")]);
    }

    #[test]
    fn test_record_until_unsubscribes() {
        let scheduler = TestScheduler::new();
        let source = scheduler.cold("a-b-c-|");
        let recorder = scheduler.record_until(&source.observable(), 3);
        scheduler.flush();

        assert_eq!(recorder.values(), vec!['a', 'b']);
        assert_eq!(source.subscriptions(), vec![parse_subscription("^--!")]);
    }
}
