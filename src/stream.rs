//! Bridge from observables to async streams.
//!
//! An observable can be consumed as a [`futures_core::Stream`] of
//! [`StreamResult`] items. Values are pushed into an unbounded tokio channel
//! as they are emitted, so the producer never waits on the consumer.

use std::cell::RefCell;
use std::pin::Pin;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::context::Context;
use crate::error::{StreamError, StreamResult};
use crate::observable::Observable;
use crate::subscriber::Observer;
use crate::subscription::Subscription;

/// Type alias for a boxed async stream of events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// An [`Observer`] that forwards into an async stream.
///
/// Each value is sent as `Ok(value)`, an error as a single `Err(err)`.
/// Either terminal event drops the channel sender, which ends the stream.
#[derive(Debug)]
pub struct EventSender<T> {
    tx: RefCell<Option<mpsc::UnboundedSender<StreamResult<T>>>>,
}

impl<T> EventSender<T> {
    /// Create a sender and the stream it feeds.
    pub fn channel() -> (Self, EventStream<StreamResult<T>>)
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            tx: RefCell::new(Some(tx)),
        };
        (sender, UnboundedReceiverStream::new(rx).boxed())
    }

    /// Check if the stream has ended or its receiver was dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().as_ref().map_or(true, |tx| tx.is_closed())
    }

    fn send(&self, item: StreamResult<T>) {
        if let Some(tx) = self.tx.borrow().as_ref() {
            if tx.send(item).is_err() {
                tracing::trace!("stream receiver dropped; discarding item");
            }
        }
    }
}

impl<T> Observer<T> for EventSender<T> {
    fn next(&self, value: T) {
        self.send(Ok(value));
    }

    fn error(&self, err: StreamError) {
        self.send(Err(err));
        self.tx.borrow_mut().take();
    }

    fn complete(&self) {
        self.tx.borrow_mut().take();
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Subscribe under the default context and consume the events as an
    /// async stream.
    ///
    /// Dropping the stream does not unsubscribe; use the returned
    /// [`Subscription`] for that.
    ///
    /// # Example
    ///
    /// ```rust
    /// use futures::StreamExt;
    /// use rivulet::Observable;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let (_subscription, stream) = Observable::of(vec![1, 2]).to_stream();
    /// let items: Vec<_> = stream.collect().await;
    /// assert_eq!(items, vec![Ok(1), Ok(2)]);
    /// # }
    /// ```
    pub fn to_stream(&self) -> (Subscription, EventStream<StreamResult<T>>) {
        self.to_stream_with(&Context::default())
    }

    /// Like [`to_stream`](Self::to_stream) under the given context.
    pub fn to_stream_with(
        &self,
        context: &Context,
    ) -> (Subscription, EventStream<StreamResult<T>>) {
        let (sender, stream) = EventSender::channel();
        let subscription = self.subscribe_with(sender, context);
        (subscription, stream)
    }
}

/// Extension trait for working with event streams.
pub trait EventStreamExt<T> {
    /// Convert into a boxed stream.
    fn boxed(self) -> EventStream<T>;
}

impl<S, T> EventStreamExt<T> for S
where
    S: Stream<Item = T> + Send + 'static,
{
    fn boxed(self) -> EventStream<T> {
        Box::pin(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Subject;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_values_then_end() {
        let (_subscription, stream) = Observable::of(vec!["a", "b"]).to_stream();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Ok("a"), Ok("b")]);
    }

    #[tokio::test]
    async fn test_error_is_last_item() {
        let source = Observable::of(vec![1, 2]).concat_map(|v| {
            if v == 2 {
                Observable::throw(StreamError::source("boom"))
            } else {
                Observable::just(v)
            }
        });
        let (_subscription, stream) = source.to_stream();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Ok(1), Err(StreamError::source("boom"))]);
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_delivery() {
        let subject = Subject::new();
        let (subscription, mut stream) = subject.as_observable().to_stream();

        subject.next(1);
        assert_eq!(stream.next().await, Some(Ok(1)));

        subscription.unsubscribe();
        subject.next(2);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_closed() {
        let (sender, stream) = EventSender::<u32>::channel();
        assert!(!sender.is_closed());
        drop(stream);
        assert!(sender.is_closed());
        sender.next(1);
    }
}
