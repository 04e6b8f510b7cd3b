//! Operators.
//!
//! Every operator is an inherent method on [`Observable`](crate::Observable)
//! that returns a new observable; subscribing to the result subscribes to
//! the source through an [`OperatorSubscriber`](crate::OperatorSubscriber).

mod basic;
mod flatten;
mod notification;
mod sequence_equal;

pub use flatten::FlattenPolicy;
