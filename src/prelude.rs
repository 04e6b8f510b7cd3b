//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits
//! from Rivulet for convenient glob imports.
//!
//! # Example
//!
//! ```rust
//! use rivulet::prelude::*;
//! ```

// Sources
pub use crate::deferred::Deferred;
pub use crate::interop::{ExternalSink, ExternalSource};
pub use crate::observable::{IntoObservable, Observable};
pub use crate::subject::{BehaviorSubject, Subject};

// Observers and lifetimes
pub use crate::notification::Notification;
pub use crate::subscriber::{Observer, ObserverFns, Subscriber};
pub use crate::subscription::{Subscription, Teardown};

// Operators
pub use crate::operators::FlattenPolicy;

// Capabilities
pub use crate::config::{Config, EngineConfig, UnhandledErrorPolicy};
pub use crate::context::{Context, Scheduler};

// Streams
pub use crate::stream::{EventStream, EventStreamExt};

// Errors
pub use crate::error::{RivuletError, RivuletResult, StreamError, StreamResult};
