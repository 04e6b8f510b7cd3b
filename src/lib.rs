//! # Rivulet
//!
//! **Rivulet** is a push-based reactive event-stream engine: lazily
//! subscribed sequences of values composed through chains of operators, with
//! deterministic synchronous propagation and guaranteed teardown.
//!
//! ## Overview
//!
//! - **Observable**: a lazy description of how to produce a sequence. Every
//!   subscription is an independent execution.
//! - **Subscriber**: the observer every operator writes into. It enforces
//!   the `next* (error | complete)?` protocol and owns a teardown tree.
//! - **Subscription**: a composable cancellation handle; disposing a parent
//!   disposes every child exactly once.
//! - **Flattening**: `exhaust_map`, `merge_map`, `switch_map` and
//!   `concat_map` are one engine parameterized by a [`FlattenPolicy`].
//! - **Notification**: events as values, for `materialize`/`dematerialize`.
//!
//! Time and unhandled errors are capabilities carried by a [`Context`]
//! rather than globals; the [`testing`] module supplies a virtual-time
//! scheduler with marble diagrams.
//!
//! ## Quick Start
//!
//! ```rust
//! use rivulet::prelude::*;
//! use rivulet::testing::Recorder;
//!
//! let clicks = Subject::new();
//! let recorder = Recorder::new();
//!
//! // While a request is in flight, further clicks are ignored.
//! let request = Deferred::new();
//! let r = request.clone();
//! clicks
//!     .as_observable()
//!     .exhaust_map(move |_: ()| r.clone())
//!     .subscribe(recorder.clone());
//!
//! clicks.next(());
//! clicks.next(());
//! request.resolve("response");
//!
//! assert_eq!(recorder.values(), vec!["response"]);
//! ```

mod config;
mod context;
mod deferred;
mod error;
mod interop;
mod notification;
mod observable;
mod operators;
mod subject;
mod subscriber;
mod subscription;
pub mod stream;
pub mod testing;

pub mod prelude;

// Re-export core types
pub use config::{Config, EngineConfig, UnhandledErrorPolicy};
pub use context::{
    CollectingReporter, Context, ErrorReporter, IgnoreReporter, ImmediateScheduler,
    PanicReporter, Scheduler, TracingReporter,
};
pub use deferred::Deferred;
pub use error::{RivuletError, RivuletResult, StreamError, StreamResult};
pub use interop::{ExternalSink, ExternalSource, Interop};
pub use notification::{Notification, NotificationKind};
pub use observable::{IntoObservable, Observable};
pub use operators::FlattenPolicy;
pub use stream::{EventSender, EventStream, EventStreamExt};
pub use subject::{BehaviorSubject, Subject};
pub use subscriber::{Observer, ObserverFns, OperatorSubscriber, Subscriber};
pub use subscription::{Subscription, Teardown, TeardownKey};
