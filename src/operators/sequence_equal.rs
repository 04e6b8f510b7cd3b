//! Pairwise comparison of two sequences.
//!
//! Each side keeps a queue of values the other side has not produced a
//! counterpart for yet. A value arriving on one side is matched against the
//! head of the other side's queue, or queued itself if that queue is empty,
//! so at most one queue is non-empty at a time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{StreamError, StreamResult};
use crate::observable::{IntoObservable, Observable};
use crate::subscriber::{OperatorSubscriber, Subscriber};
use crate::subscription::Teardown;

struct Side<V> {
    pending: VecDeque<V>,
    completed: bool,
}

impl<V> Side<V> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            completed: false,
        }
    }
}

type Comparator<T, U> = dyn Fn(&T, &U) -> StreamResult<bool>;

/// Outcome of a value arriving on one side; `Some` settles the comparison.
fn on_value<V, W>(
    own: &RefCell<Side<V>>,
    other: &RefCell<Side<W>>,
    value: V,
    matches: impl Fn(&V, &W) -> StreamResult<bool>,
) -> StreamResult<Option<bool>> {
    let counterpart = {
        let mut other = other.borrow_mut();
        match other.pending.pop_front() {
            Some(counterpart) => counterpart,
            None if other.completed => return Ok(Some(false)),
            None => {
                own.borrow_mut().pending.push_back(value);
                return Ok(None);
            }
        }
    };
    Ok((!matches(&value, &counterpart)?).then_some(false))
}

/// Outcome of one side completing.
fn on_completed<V, W>(own: &RefCell<Side<V>>, other: &RefCell<Side<W>>) -> Option<bool> {
    own.borrow_mut().completed = true;
    let own = own.borrow();
    let other = other.borrow();
    if !other.pending.is_empty() {
        return Some(false);
    }
    if other.completed {
        return Some(own.pending.is_empty());
    }
    None
}

fn settle(destination: &Subscriber<bool>, verdict: StreamResult<Option<bool>>) {
    match verdict {
        Ok(Some(equal)) => {
            destination.next(equal);
            destination.complete();
        }
        Ok(None) => {}
        Err(err) => destination.error(err),
    }
}

impl<T: 'static> Observable<T> {
    /// Emit whether this sequence and `other` are equal, then complete.
    ///
    /// `other` may be any [`IntoObservable`], including a
    /// [`Deferred`](crate::Deferred) single value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rivulet::Observable;
    /// use rivulet::testing::Recorder;
    ///
    /// let recorder = Recorder::new();
    /// Observable::of(vec![1, 2, 3])
    ///     .sequence_equal(Observable::of(vec![1, 2, 3]))
    ///     .subscribe(recorder.clone());
    /// assert_eq!(recorder.values(), vec![true]);
    /// ```
    pub fn sequence_equal(self, other: impl IntoObservable<T>) -> Observable<bool>
    where
        T: PartialEq,
    {
        self.sequence_equal_by(other, |a: &T, b: &T| a == b)
    }

    /// Like [`sequence_equal`](Self::sequence_equal) with a custom comparator,
    /// which also allows the two sides to carry different types.
    pub fn sequence_equal_by<U: 'static>(
        self,
        other: impl IntoObservable<U>,
        comparator: impl Fn(&T, &U) -> bool + 'static,
    ) -> Observable<bool> {
        compare(
            self,
            other.into_observable(),
            Rc::new(move |a: &T, b: &U| -> StreamResult<bool> { Ok(comparator(a, b)) }),
        )
    }

    /// Like [`sequence_equal_by`](Self::sequence_equal_by) with a comparator
    /// that can fail; a failure becomes a [`StreamError::Comparator`] error.
    pub fn try_sequence_equal_by<U: 'static>(
        self,
        other: impl IntoObservable<U>,
        comparator: impl Fn(&T, &U) -> Result<bool, String> + 'static,
    ) -> Observable<bool> {
        compare(
            self,
            other.into_observable(),
            Rc::new(move |a: &T, b: &U| comparator(a, b).map_err(StreamError::Comparator)),
        )
    }
}

fn compare<T: 'static, U: 'static>(
    source: Observable<T>,
    other: Observable<U>,
    comparator: Rc<Comparator<T, U>>,
) -> Observable<bool> {
    Observable::new(move |destination: Subscriber<bool>| {
        let left = Rc::new(RefCell::new(Side::<T>::new()));
        let right = Rc::new(RefCell::new(Side::<U>::new()));

        let (l, r, cmp) = (left.clone(), right.clone(), comparator.clone());
        let (lc, rc) = (left.clone(), right.clone());
        let left_subscriber = OperatorSubscriber::new(&destination, move |dest, value: T| {
            settle(dest, on_value(&l, &r, value, |a, b| cmp(a, b)))
        })
        .on_complete(move |dest| settle(dest, Ok(on_completed(&lc, &rc))))
        .build();

        let (l, r, cmp) = (left.clone(), right.clone(), comparator.clone());
        let right_subscriber = OperatorSubscriber::new(&destination, move |dest, value: U| {
            settle(dest, on_value(&r, &l, value, |b, a| cmp(a, b)))
        })
        .on_complete(move |dest| settle(dest, Ok(on_completed(&right, &left))))
        .build();

        source.subscribe_subscriber(left_subscriber);
        other.subscribe_subscriber(right_subscriber);
        Teardown::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::subject::Subject;
    use crate::testing::Recorder;
    use crate::Notification;

    fn verdict(a: Vec<i32>, b: Vec<i32>) -> Vec<Notification<bool>> {
        let recorder = Recorder::new();
        Observable::of(a)
            .sequence_equal(Observable::of(b))
            .subscribe(recorder.clone());
        recorder.notifications()
    }

    #[test]
    fn test_equal_sequences() {
        assert_eq!(
            verdict(vec![1, 2, 3], vec![1, 2, 3]),
            vec![Notification::Next(true), Notification::Complete]
        );
        assert_eq!(
            verdict(vec![], vec![]),
            vec![Notification::Next(true), Notification::Complete]
        );
    }

    #[test]
    fn test_value_and_length_mismatch() {
        assert_eq!(verdict(vec![1, 2, 3], vec![1, 9, 3])[0], Notification::Next(false));
        assert_eq!(verdict(vec![1, 2], vec![1, 2, 3])[0], Notification::Next(false));
        assert_eq!(verdict(vec![1, 2, 3], vec![1, 2])[0], Notification::Next(false));
    }

    #[test]
    fn test_short_circuits_on_first_mismatch() {
        let a = Subject::new();
        let b = Subject::new();
        let recorder = Recorder::new();
        a.as_observable()
            .sequence_equal(b.as_observable())
            .subscribe(recorder.clone());

        a.next(1);
        a.next(2);
        b.next(1);
        assert!(recorder.notifications().is_empty());
        b.next(5);

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Next(false), Notification::Complete]
        );
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 0);
    }

    #[test]
    fn test_extra_values_detected_on_completion() {
        let a = Subject::new();
        let b = Subject::new();
        let recorder = Recorder::new();
        a.as_observable()
            .sequence_equal(b.as_observable())
            .subscribe(recorder.clone());

        b.next(1);
        b.next(2);
        a.next(1);
        a.complete();

        assert_eq!(recorder.values(), vec![false]);
    }

    #[test]
    fn test_comparator_across_types() {
        let recorder = Recorder::new();
        Observable::of(vec![1, 2])
            .sequence_equal_by(Observable::of(vec!["1", "2"]), |a: &i32, b: &&str| {
                a.to_string() == *b
            })
            .subscribe(recorder.clone());
        assert_eq!(recorder.values(), vec![true]);
    }

    #[test]
    fn test_error_propagates() {
        let recorder = Recorder::new();
        Observable::of(vec![1])
            .sequence_equal(Observable::throw(StreamError::source("other side")))
            .subscribe(recorder.clone());
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Error(StreamError::source("other side"))]
        );
    }

    #[test]
    fn test_failing_comparator_errors() {
        let recorder = Recorder::new();
        Observable::of(vec![1, 2])
            .try_sequence_equal_by(Observable::of(vec![1.0, f64::NAN]), |a: &i32, b: &f64| {
                if b.is_nan() {
                    Err("cannot compare NaN".to_string())
                } else {
                    Ok(f64::from(*a) == *b)
                }
            })
            .subscribe(recorder.clone());
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Error(StreamError::Comparator(
                "cannot compare NaN".to_string()
            ))]
        );
    }

    #[test]
    fn test_deferred_as_other_side() {
        let deferred = Deferred::new();
        let recorder = Recorder::new();
        Observable::of(vec![4])
            .sequence_equal(deferred.clone())
            .subscribe(recorder.clone());
        assert!(recorder.notifications().is_empty());

        deferred.resolve(4);
        assert_eq!(recorder.values(), vec![true]);
    }
}
