//! Leaf operators built directly on [`OperatorSubscriber`].

use std::cell::Cell;
use std::rc::Rc;

use crate::observable::Observable;
use crate::subscriber::{OperatorSubscriber, Subscriber};
use crate::subscription::Teardown;

impl<T: 'static> Observable<T> {
    /// Transform each value.
    pub fn map<R: 'static>(self, f: impl Fn(T) -> R + 'static) -> Observable<R> {
        let f = Rc::new(f);
        Observable::new(move |destination: Subscriber<R>| {
            let f = f.clone();
            let upstream = OperatorSubscriber::new(&destination, move |dest, value| {
                dest.next(f(value))
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }

    /// Keep values matching `predicate`.
    pub fn filter(self, predicate: impl Fn(&T) -> bool + 'static) -> Observable<T> {
        let predicate = Rc::new(predicate);
        Observable::new(move |destination: Subscriber<T>| {
            let predicate = predicate.clone();
            let upstream = OperatorSubscriber::new(&destination, move |dest, value| {
                if predicate(&value) {
                    dest.next(value);
                }
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }

    /// Run a side effect for each value.
    pub fn tap(self, f: impl Fn(&T) + 'static) -> Observable<T> {
        let f = Rc::new(f);
        Observable::new(move |destination: Subscriber<T>| {
            let f = f.clone();
            let upstream = OperatorSubscriber::new(&destination, move |dest, value| {
                f(&value);
                dest.next(value);
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }

    /// Emit the first `count` values, then complete and dispose the source.
    pub fn take(self, count: usize) -> Observable<T> {
        if count == 0 {
            return Observable::empty();
        }
        Observable::new(move |destination: Subscriber<T>| {
            let seen = Rc::new(Cell::new(0usize));
            let upstream = OperatorSubscriber::new(&destination, move |dest, value| {
                let n = seen.get() + 1;
                if n > count {
                    return;
                }
                seen.set(n);
                dest.next(value);
                if n == count {
                    dest.complete();
                }
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }

    /// Emit values while `predicate` holds; complete on the first miss.
    pub fn take_while(self, predicate: impl Fn(&T) -> bool + 'static) -> Observable<T> {
        let predicate = Rc::new(predicate);
        Observable::new(move |destination: Subscriber<T>| {
            let predicate = predicate.clone();
            let upstream = OperatorSubscriber::new(&destination, move |dest, value| {
                if predicate(&value) {
                    dest.next(value);
                } else {
                    dest.complete();
                }
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }

    /// Run `f` once when the subscription ends for any reason.
    pub fn finalize(self, f: impl Fn() + 'static) -> Observable<T> {
        let f = Rc::new(f);
        Observable::new(move |destination: Subscriber<T>| {
            self.subscribe_subscriber(destination.clone());
            let f = f.clone();
            Teardown::action(move || f())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use crate::{Notification, StreamError};
    use std::cell::RefCell;

    #[test]
    fn test_map_filter() {
        let recorder = Recorder::new();
        Observable::of(vec![1, 2, 3, 4])
            .filter(|v| v % 2 == 0)
            .map(|v| v * 10)
            .subscribe(recorder.clone());

        assert_eq!(recorder.values(), vec![20, 40]);
    }

    #[test]
    fn test_take_stops_synchronous_source() {
        let produced = Rc::new(Cell::new(0));
        let p = produced.clone();
        let source = Observable::new(move |subscriber| {
            let mut i = 0;
            while !subscriber.is_closed() && i < 100 {
                p.set(p.get() + 1);
                subscriber.next(i);
                i += 1;
            }
            Teardown::empty()
        });

        let recorder = Recorder::new();
        source.take(2).subscribe(recorder.clone());

        assert_eq!(produced.get(), 2);
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Next(0), Notification::Next(1), Notification::Complete]
        );
    }

    #[test]
    fn test_take_zero_completes() {
        let recorder = Recorder::new();
        Observable::of(vec![1]).take(0).subscribe(recorder.clone());
        assert_eq!(recorder.notifications(), vec![Notification::Complete]);
    }

    #[test]
    fn test_take_while() {
        let recorder = Recorder::new();
        Observable::of(vec![1, 2, 3, 1])
            .take_while(|v| *v < 3)
            .subscribe(recorder.clone());
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Next(1), Notification::Next(2), Notification::Complete]
        );
    }

    #[test]
    fn test_finalize_runs_on_error_and_unsubscribe() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        Observable::<i32>::throw(StreamError::source("x"))
            .finalize(move || l.borrow_mut().push("errored"))
            .subscribe(Recorder::new());

        let l = log.clone();
        let sub = Observable::<i32>::never()
            .finalize(move || l.borrow_mut().push("unsubscribed"))
            .subscribe(Recorder::new());
        sub.unsubscribe();
        sub.unsubscribe();

        assert_eq!(*log.borrow(), vec!["errored", "unsubscribed"]);
    }

    #[test]
    fn test_tap_sees_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        Observable::of(vec!['a', 'b'])
            .tap(move |v| s.borrow_mut().push(*v))
            .subscribe(Recorder::new());
        assert_eq!(*seen.borrow(), vec!['a', 'b']);
    }
}
