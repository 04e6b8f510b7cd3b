//! Reified stream events.

use std::fmt;

use crate::error::StreamError;
use crate::observable::Observable;
use crate::subscriber::Observer;
use crate::subscription::Teardown;

/// The kind of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// A value
    Next,
    /// Terminal error
    Error,
    /// Terminal completion
    Complete,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => write!(f, "N"),
            Self::Error => write!(f, "E"),
            Self::Complete => write!(f, "C"),
        }
    }
}

/// One event of a stream, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<T> {
    /// A value
    Next(T),
    /// The stream failed
    Error(StreamError),
    /// The stream completed
    Complete,
}

impl<T> Notification<T> {
    /// The kind tag.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Next(_) => NotificationKind::Next,
            Notification::Error(_) => NotificationKind::Error,
            Notification::Complete => NotificationKind::Complete,
        }
    }

    /// The carried value, for `Next`.
    pub fn value(&self) -> Option<&T> {
        match self {
            Notification::Next(v) => Some(v),
            _ => None,
        }
    }

    /// The carried error, for `Error`.
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Notification::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is `Error` or `Complete`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }

    /// Deliver this notification to an observer.
    pub fn accept<O: Observer<T> + ?Sized>(self, observer: &O) {
        match self {
            Notification::Next(v) => observer.next(v),
            Notification::Error(e) => observer.error(e),
            Notification::Complete => observer.complete(),
        }
    }

    /// Map the carried value, keeping the kind.
    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Notification<R> {
        match self {
            Notification::Next(v) => Notification::Next(f(v)),
            Notification::Error(e) => Notification::Error(e),
            Notification::Complete => Notification::Complete,
        }
    }
}

impl<T: Clone + 'static> Notification<T> {
    /// An observable that replays this single notification.
    ///
    /// A `Next` is followed by completion.
    pub fn into_observable(self) -> Observable<T> {
        Observable::new(move |subscriber| {
            let notification = self.clone();
            let terminal = notification.is_terminal();
            notification.accept(&subscriber);
            if !terminal {
                subscriber.complete();
            }
            Teardown::empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_accessors() {
        let next = Notification::Next(3);
        assert_eq!(next.kind(), NotificationKind::Next);
        assert_eq!(next.value(), Some(&3));
        assert!(next.error().is_none());
        assert!(!next.is_terminal());

        let err: Notification<i32> = Notification::Error(StreamError::source("bad"));
        assert_eq!(err.kind().to_string(), "E");
        assert_eq!(err.error(), Some(&StreamError::source("bad")));
        assert!(err.is_terminal());

        let done: Notification<i32> = Notification::Complete;
        assert_eq!(done.kind().to_string(), "C");
        assert!(done.value().is_none());
    }

    #[test]
    fn test_map_keeps_kind() {
        assert_eq!(Notification::Next(2).map(|v| v * 10), Notification::Next(20));
        let done: Notification<i32> = Notification::Complete;
        assert_eq!(done.map(|v| v * 10), Notification::Complete);
    }
}
