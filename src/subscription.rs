//! Composable cancellation handles.
//!
//! A [`Subscription`] owns an ordered set of [`Teardown`]s. Unsubscribing
//! runs every teardown exactly once, children included, and is idempotent.
//! Parents own their children; a child only keeps a weak handle plus the
//! key under which its parent stores it, so it can detach itself when it is
//! disposed first.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

/// A unit of cleanup attached to a [`Subscription`].
pub enum Teardown {
    /// Nothing to clean up
    Empty,
    /// Cleanup callback, run once
    Action(Box<dyn FnOnce()>),
    /// Nested subscription, unsubscribed with its parent
    Subscription(Subscription),
}

impl Teardown {
    /// A teardown that does nothing.
    pub fn empty() -> Self {
        Teardown::Empty
    }

    /// A teardown that runs `f` once on disposal.
    pub fn action(f: impl FnOnce() + 'static) -> Self {
        Teardown::Action(Box::new(f))
    }

    fn execute(self) {
        match self {
            Teardown::Empty => {}
            Teardown::Action(f) => f(),
            Teardown::Subscription(sub) => sub.unsubscribe(),
        }
    }
}

impl From<Subscription> for Teardown {
    fn from(sub: Subscription) -> Self {
        Teardown::Subscription(sub)
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Empty => write!(f, "Teardown::Empty"),
            Teardown::Action(_) => write!(f, "Teardown::Action"),
            Teardown::Subscription(sub) => write!(f, "Teardown::Subscription({:?})", sub),
        }
    }
}

/// Key under which a teardown is stored in its owning subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeardownKey(u64);

struct Inner {
    closed: Cell<bool>,
    next_key: Cell<u64>,
    teardowns: RefCell<BTreeMap<TeardownKey, Teardown>>,
    parents: RefCell<Vec<(Weak<Inner>, TeardownKey)>>,
}

/// A cancellation handle and the root of a teardown tree.
///
/// Cloning a `Subscription` clones the handle, not the tree. Dropping a
/// handle never unsubscribes.
#[derive(Clone)]
pub struct Subscription {
    inner: Rc<Inner>,
}

impl Subscription {
    /// Create a new open subscription.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                closed: Cell::new(false),
                next_key: Cell::new(0),
                teardowns: RefCell::new(BTreeMap::new()),
                parents: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a subscription that is already closed.
    pub fn closed() -> Self {
        let sub = Self::new();
        sub.inner.closed.set(true);
        sub
    }

    /// Whether this subscription has been disposed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Attach a teardown.
    ///
    /// If this subscription is already closed the teardown runs right away
    /// and `None` is returned.
    pub fn add(&self, teardown: Teardown) -> Option<TeardownKey> {
        match &teardown {
            Teardown::Empty => return None,
            Teardown::Subscription(child) => {
                if Rc::ptr_eq(&child.inner, &self.inner) || child.is_closed() {
                    return None;
                }
            }
            Teardown::Action(_) => {}
        }

        if self.is_closed() {
            teardown.execute();
            return None;
        }

        let key = TeardownKey(self.inner.next_key.get());
        self.inner.next_key.set(key.0 + 1);
        if let Teardown::Subscription(child) = &teardown {
            child
                .inner
                .parents
                .borrow_mut()
                .push((Rc::downgrade(&self.inner), key));
        }
        self.inner.teardowns.borrow_mut().insert(key, teardown);
        Some(key)
    }

    /// Attach a cleanup callback.
    pub fn add_action(&self, f: impl FnOnce() + 'static) -> Option<TeardownKey> {
        self.add(Teardown::action(f))
    }

    /// Detach a teardown without running it.
    pub fn remove(&self, key: TeardownKey) -> Option<Teardown> {
        let removed = self.inner.teardowns.borrow_mut().remove(&key);
        if let Some(Teardown::Subscription(child)) = &removed {
            child
                .inner
                .parents
                .borrow_mut()
                .retain(|(parent, k)| !(*k == key && ptr_eq_weak(parent, &self.inner)));
        }
        removed
    }

    /// Number of teardowns currently attached.
    pub fn len(&self) -> usize {
        self.inner.teardowns.borrow().len()
    }

    /// Whether no teardowns are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose this subscription and everything it owns.
    ///
    /// Safe to call from inside a teardown or a notification that is still
    /// on the stack; every call after the first is a no-op.
    pub fn unsubscribe(&self) {
        if self.inner.closed.replace(true) {
            return;
        }

        let parents = mem::take(&mut *self.inner.parents.borrow_mut());
        for (parent, key) in parents {
            if let Some(parent) = parent.upgrade() {
                let removed = parent.teardowns.borrow_mut().remove(&key);
                drop(removed);
            }
        }

        let teardowns = mem::take(&mut *self.inner.teardowns.borrow_mut());
        if !teardowns.is_empty() {
            tracing::debug!(count = teardowns.len(), "disposing subscription");
        }
        for (_, teardown) in teardowns {
            teardown.execute();
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .field("teardowns", &self.len())
            .finish()
    }
}

fn ptr_eq_weak(weak: &Weak<Inner>, strong: &Rc<Inner>) -> bool {
    std::ptr::eq(weak.as_ptr(), Rc::as_ptr(strong))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Teardown) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move || {
            let c = c.clone();
            Teardown::action(move || c.set(c.get() + 1))
        })
    }

    #[test]
    fn test_unsubscribe_runs_teardowns_once() {
        let (count, make) = counter();
        let sub = Subscription::new();
        sub.add(make());
        sub.add(make());

        sub.unsubscribe();
        sub.unsubscribe();

        assert_eq!(count.get(), 2);
        assert!(sub.is_closed());
        assert!(sub.is_empty());
    }

    #[test]
    fn test_children_disposed_with_parent() {
        let (count, make) = counter();
        let parent = Subscription::new();
        let child = Subscription::new();
        child.add(make());
        parent.add(child.clone().into());

        parent.unsubscribe();

        assert!(child.is_closed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_add_to_closed_runs_immediately() {
        let (count, make) = counter();
        let sub = Subscription::closed();

        assert!(sub.add(make()).is_none());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_child_detaches_from_parent() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(child.clone().into());
        assert_eq!(parent.len(), 1);

        child.unsubscribe();

        assert_eq!(parent.len(), 0);
        assert!(!parent.is_closed());
    }

    #[test]
    fn test_remove_does_not_run() {
        let (count, make) = counter();
        let sub = Subscription::new();
        let key = sub.add(make()).unwrap();

        assert!(sub.remove(key).is_some());
        sub.unsubscribe();

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_reentrant_unsubscribe_from_teardown() {
        let sub = Subscription::new();
        let again = sub.clone();
        let (count, make) = counter();
        sub.add_action(move || again.unsubscribe());
        sub.add(make());

        sub.unsubscribe();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_teardowns_run_in_insertion_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let sub = Subscription::new();
        for i in 0..3 {
            let order = order.clone();
            sub.add_action(move || order.borrow_mut().push(i));
        }

        sub.unsubscribe();

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}
