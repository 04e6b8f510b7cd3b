//! Capabilities passed explicitly through every subscribe call.
//!
//! A [`Context`] bundles the [`Scheduler`] time source, the
//! [`ErrorReporter`] that receives errors nobody handles, and the
//! [`EngineConfig`]. Operators hand their downstream subscriber's context to
//! every upstream and inner subscription they create, so a whole chain
//! shares one context without any global state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::config::{Config, EngineConfig, UnhandledErrorPolicy};
use crate::error::{RivuletError, RivuletResult, StreamError};
use crate::subscription::Subscription;

/// A source of time and deferred work.
///
/// The engine only ever calls into a scheduler; it never drives one.
pub trait Scheduler {
    /// Current time in scheduler ticks.
    fn now(&self) -> u64;

    /// Run `work` after `delay` ticks.
    ///
    /// Unsubscribing the returned subscription cancels the work if it has
    /// not run yet.
    fn schedule(&self, delay: u64, work: Box<dyn FnOnce()>) -> Subscription;
}

/// Runs all work inline on the calling stack.
///
/// Delays collapse to zero, which keeps fully synchronous pipelines
/// synchronous. Time is reported in milliseconds since creation.
#[derive(Debug, Clone)]
pub struct ImmediateScheduler {
    started: Instant,
}

impl ImmediateScheduler {
    /// Create a new immediate scheduler.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ImmediateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn schedule(&self, _delay: u64, work: Box<dyn FnOnce()>) -> Subscription {
        work();
        Subscription::closed()
    }
}

/// Receives errors that reached a subscriber with no error handler.
pub trait ErrorReporter {
    /// Report an unhandled error.
    fn report(&self, err: &StreamError);
}

/// Logs unhandled errors at error level. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &StreamError) {
        tracing::error!(error = %err, kind = err.as_label(), "unhandled stream error");
    }
}

/// Treats an unhandled error as fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicReporter;

impl ErrorReporter for PanicReporter {
    fn report(&self, err: &StreamError) {
        panic!("unhandled stream error: {err}");
    }
}

/// Drops unhandled errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreReporter;

impl ErrorReporter for IgnoreReporter {
    fn report(&self, _err: &StreamError) {}
}

/// Records unhandled errors for later inspection.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    errors: Rc<RefCell<Vec<StreamError>>>,
}

impl CollectingReporter {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors reported so far.
    pub fn errors(&self) -> Vec<StreamError> {
        self.errors.borrow().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, err: &StreamError) {
        self.errors.borrow_mut().push(err.clone());
    }
}

/// The capabilities a subscription runs with.
#[derive(Clone)]
pub struct Context {
    scheduler: Rc<dyn Scheduler>,
    reporter: Rc<dyn ErrorReporter>,
    config: Rc<EngineConfig>,
}

impl Context {
    /// Build a context from a validated configuration.
    ///
    /// The reporter is chosen from [`EngineConfig::unhandled_errors`]; the
    /// scheduler is an [`ImmediateScheduler`].
    pub fn from_config(config: EngineConfig) -> RivuletResult<Self> {
        config.validate().map_err(RivuletError::Config)?;
        let reporter: Rc<dyn ErrorReporter> = match config.unhandled_errors {
            UnhandledErrorPolicy::Log => Rc::new(TracingReporter),
            UnhandledErrorPolicy::Panic => Rc::new(PanicReporter),
            UnhandledErrorPolicy::Ignore => Rc::new(IgnoreReporter),
        };
        Ok(Self {
            scheduler: Rc::new(ImmediateScheduler::new()),
            reporter,
            config: Rc::new(config),
        })
    }

    /// Replace the scheduler.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Rc::new(scheduler);
        self
    }

    /// Replace the unhandled error reporter.
    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Rc::new(reporter);
        self
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hand an unhandled error to the reporter.
    pub fn report_unhandled(&self, err: &StreamError) {
        self.reporter.report(err);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self {
            scheduler: Rc::new(ImmediateScheduler::new()),
            reporter: Rc::new(TracingReporter),
            config: Rc::new(EngineConfig::default()),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.config.name())
            .field("now", &self.scheduler.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_immediate_scheduler_runs_inline() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let sub = ImmediateScheduler::new().schedule(100, Box::new(move || r.set(true)));

        assert!(ran.get());
        assert!(sub.is_closed());
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let result = Context::from_config(EngineConfig::new().with_default_concurrency(0));
        assert!(matches!(result, Err(RivuletError::Config(_))));
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        let ctx = Context::default().with_reporter(reporter.clone());

        ctx.report_unhandled(&StreamError::source("lost"));

        assert_eq!(reporter.errors(), vec![StreamError::source("lost")]);
    }

    #[test]
    #[should_panic(expected = "unhandled stream error: fatal")]
    fn test_panic_policy() {
        let ctx = Context::from_config(
            EngineConfig::new().with_unhandled_errors(UnhandledErrorPolicy::Panic),
        )
        .unwrap();
        ctx.report_unhandled(&StreamError::source("fatal"));
    }
}
