//! `materialize` and `dematerialize`.

use crate::notification::Notification;
use crate::observable::Observable;
use crate::subscriber::{OperatorSubscriber, Subscriber};
use crate::subscription::Teardown;

impl<T: 'static> Observable<T> {
    /// Turn every event into a value.
    ///
    /// The result emits one [`Notification`] per source event and always
    /// completes normally: a source error is captured as
    /// `Notification::Error`, not propagated.
    pub fn materialize(self) -> Observable<Notification<T>> {
        Observable::new(move |destination: Subscriber<Notification<T>>| {
            let upstream = OperatorSubscriber::new(&destination, |dest, value| {
                dest.next(Notification::Next(value))
            })
            .on_error(|dest, err| {
                dest.next(Notification::Error(err));
                dest.complete();
            })
            .on_complete(|dest| {
                dest.next(Notification::Complete);
                dest.complete();
            })
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }
}

impl<T: 'static> Observable<Notification<T>> {
    /// Replay reified events as real ones; the inverse of
    /// [`materialize`](Observable::materialize).
    pub fn dematerialize(self) -> Observable<T> {
        Observable::new(move |destination: Subscriber<T>| {
            let upstream = OperatorSubscriber::new(
                &destination,
                |dest, notification: Notification<T>| notification.accept(dest),
            )
            .build();
            self.subscribe_subscriber(upstream);
            Teardown::empty()
        })
    }
}
