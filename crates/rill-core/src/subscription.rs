#![forbid(unsafe_code)]

//! Hierarchical cancellation registry.
//!
//! A [`Subscription`] is a node holding an ordered list of finalizers. A
//! finalizer is either a closure or another `Subscription` (a child). Children
//! keep non-owning back-references to every parent they were added to, so a
//! child unsubscribed directly detaches itself and is never torn down twice.
//!
//! # Invariants
//!
//! 1. `closed` is monotonic; it is set before any finalizer runs.
//! 2. `unsubscribe()` runs each finalizer at most once, in insertion order,
//!    even when earlier finalizers fail or panic.
//! 3. A node never owns its parents (back-references are `Weak`).
//! 4. Adding a node to itself is a no-op.
//!
//! # Example
//!
//! ```
//! use rill_core::Subscription;
//!
//! let parent = Subscription::new();
//! let child = Subscription::new();
//! parent.add(&child);
//! child.add_fn(|| println!("child torn down"));
//!
//! parent.unsubscribe().unwrap();
//! assert!(child.closed());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::report_unhandled_error;
use crate::error::{BoxError, TeardownError, UnhandledError, UnsubscriptionError};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a subscription node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A cleanup action registered on a [`Subscription`].
#[derive(Default)]
pub enum Teardown {
    /// Nothing to do.
    #[default]
    Empty,
    /// Infallible cleanup.
    Callback(Box<dyn FnOnce()>),
    /// Cleanup that may fail; failures are collected into the aggregate.
    Fallible(Box<dyn FnOnce() -> Result<(), BoxError>>),
    /// A child node, unsubscribed with its parent.
    Subscription(Subscription),
}

impl Teardown {
    /// Wrap an infallible closure.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Self::Callback(Box::new(f))
    }

    /// Wrap a fallible closure.
    pub fn fallible(f: impl FnOnce() -> Result<(), BoxError> + 'static) -> Self {
        Self::Fallible(Box::new(f))
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Teardown::Empty"),
            Self::Callback(_) => f.write_str("Teardown::Callback(..)"),
            Self::Fallible(_) => f.write_str("Teardown::Fallible(..)"),
            Self::Subscription(sub) => f.debug_tuple("Teardown::Subscription").field(sub).finish(),
        }
    }
}

impl From<Subscription> for Teardown {
    fn from(sub: Subscription) -> Self {
        Self::Subscription(sub)
    }
}

impl From<&Subscription> for Teardown {
    fn from(sub: &Subscription) -> Self {
        Self::Subscription(sub.clone())
    }
}

/// Handle for removing a registered finalizer without running it.
///
/// Closures have no identity, so [`Subscription::add`] hands back a key.
/// A `&Subscription` converts directly to the key of that child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownKey {
    /// Nothing was registered (empty teardown, self-add, or closed target).
    None,
    /// A child subscription.
    Child(SubscriptionId),
    /// A closure finalizer local to one parent.
    Local(u64),
}

impl From<&Subscription> for TeardownKey {
    fn from(sub: &Subscription) -> Self {
        Self::Child(sub.id())
    }
}

struct Entry {
    key: TeardownKey,
    teardown: Teardown,
}

struct Inner {
    id: SubscriptionId,
    closed: bool,
    initial: Option<Teardown>,
    finalizers: Vec<Entry>,
    parents: Vec<Weak<RefCell<Inner>>>,
    next_key: u64,
}

/// A cancellable node in a resource-ownership tree.
///
/// Cloning yields another handle to the same node. Dropping a handle does
/// not unsubscribe; use [`Subscription::into_guard`] for scope-bound cleanup.
#[derive(Clone)]
pub struct Subscription {
    inner: Rc<RefCell<Inner>>,
}

impl Subscription {
    /// Create an open subscription with no finalizers.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, false)
    }

    /// Create an open subscription whose `initial` teardown runs before any
    /// finalizer added later.
    #[must_use]
    pub fn new_with(initial: impl Into<Teardown>) -> Self {
        Self::build(Some(initial.into()), false)
    }

    /// A subscription that is already closed.
    #[must_use]
    pub fn empty() -> Self {
        Self::build(None, true)
    }

    fn build(initial: Option<Teardown>, closed: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id: SubscriptionId::next(),
                closed,
                initial,
                finalizers: Vec::new(),
                parents: Vec::new(),
                next_key: 0,
            })),
        }
    }

    /// Identity of this node.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.inner.borrow().id
    }

    /// Whether `unsubscribe()` has started on this node.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Number of finalizers currently registered (excluding the initial one).
    #[must_use]
    pub fn finalizer_count(&self) -> usize {
        self.inner.borrow().finalizers.len()
    }

    /// Number of live parents this node is registered with.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.inner
            .borrow()
            .parents
            .iter()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    /// Register a finalizer.
    ///
    /// On a closed subscription the teardown runs immediately; its failures
    /// go to the unhandled-error hook. A child that is itself closed, or that
    /// is already registered here, is ignored. Adding a node to itself is a
    /// no-op.
    pub fn add(&self, teardown: impl Into<Teardown>) -> TeardownKey {
        match teardown.into() {
            Teardown::Empty => TeardownKey::None,
            Teardown::Subscription(child) => self.add_child(child),
            teardown => {
                let mut inner = self.inner.borrow_mut();
                if inner.closed {
                    drop(inner);
                    run_detached(teardown);
                    return TeardownKey::None;
                }
                inner.next_key += 1;
                let key = TeardownKey::Local(inner.next_key);
                inner.finalizers.push(Entry { key, teardown });
                key
            }
        }
    }

    /// Register an infallible closure.
    pub fn add_fn(&self, f: impl FnOnce() + 'static) -> TeardownKey {
        self.add(Teardown::from_fn(f))
    }

    /// Register a fallible closure.
    pub fn add_fallible(&self, f: impl FnOnce() -> Result<(), BoxError> + 'static) -> TeardownKey {
        self.add(Teardown::fallible(f))
    }

    fn add_child(&self, child: Subscription) -> TeardownKey {
        if Rc::ptr_eq(&self.inner, &child.inner) {
            return TeardownKey::None;
        }
        if self.closed() {
            run_detached(Teardown::Subscription(child));
            return TeardownKey::None;
        }
        let key = TeardownKey::Child(child.id());
        {
            let mut child_inner = child.inner.borrow_mut();
            if child_inner.closed {
                return TeardownKey::None;
            }
            let already = child_inner
                .parents
                .iter()
                .any(|p| p.upgrade().is_some_and(|p| Rc::ptr_eq(&p, &self.inner)));
            if already {
                return key;
            }
            child_inner.parents.push(Rc::downgrade(&self.inner));
        }
        self.inner.borrow_mut().finalizers.push(Entry {
            key,
            teardown: Teardown::Subscription(child),
        });
        key
    }

    /// Unregister a finalizer without running it.
    pub fn remove(&self, key: impl Into<TeardownKey>) {
        let key = key.into();
        if key == TeardownKey::None {
            return;
        }
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let pos = inner.finalizers.iter().position(|entry| entry.key == key);
            pos.map(|pos| inner.finalizers.remove(pos))
        };
        if let Some(Entry {
            teardown: Teardown::Subscription(child),
            ..
        }) = removed
        {
            child.remove_parent(&self.inner);
        }
    }

    fn remove_parent(&self, parent: &Rc<RefCell<Inner>>) {
        let mut inner = self.inner.borrow_mut();
        inner.parents.retain(|p| p.strong_count() > 0);
        if let Some(pos) = inner
            .parents
            .iter()
            .position(|p| p.upgrade().is_some_and(|p| Rc::ptr_eq(&p, parent)))
        {
            inner.parents.swap_remove(pos);
        }
    }

    /// Tear this node down.
    ///
    /// Idempotent. Every finalizer runs even if earlier ones fail; failures
    /// (including nested ones from child subscriptions) are returned together
    /// once all have run.
    pub fn unsubscribe(&self) -> Result<(), UnsubscriptionError> {
        let (id, initial, finalizers, parents) = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            (
                inner.id,
                inner.initial.take(),
                mem::take(&mut inner.finalizers),
                mem::take(&mut inner.parents),
            )
        };

        let own_key = TeardownKey::Child(id);
        for parent in parents.iter().filter_map(Weak::upgrade) {
            let detached = {
                let mut parent = parent.borrow_mut();
                let pos = parent.finalizers.iter().position(|entry| entry.key == own_key);
                pos.map(|pos| parent.finalizers.remove(pos))
            };
            drop(detached);
        }

        let mut errors = Vec::new();
        if let Some(initial) = initial {
            execute(initial, &mut errors);
        }
        let count = finalizers.len();
        for entry in finalizers {
            execute(entry.teardown, &mut errors);
        }
        tracing::trace!(
            subscription = %id,
            finalizers = count,
            failures = errors.len(),
            "subscription closed"
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(UnsubscriptionError::new(errors))
        }
    }

    /// Unsubscribe, handing any failure to the unhandled-error hook.
    ///
    /// For call sites with no caller left to receive the aggregate.
    pub fn unsubscribe_or_report(&self) {
        if let Err(err) = self.unsubscribe() {
            report_unhandled_error(UnhandledError::Teardown(err));
        }
    }

    /// Wrap this handle in a guard that unsubscribes on drop.
    #[must_use]
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard {
            subscription: Some(self),
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Subscription")
                .field("id", &inner.id)
                .field("closed", &inner.closed)
                .field("finalizers", &inner.finalizers.len())
                .field("parents", &inner.parents.len())
                .finish(),
            Err(_) => f.debug_struct("Subscription").finish_non_exhaustive(),
        }
    }
}

/// RAII guard that unsubscribes when dropped.
///
/// Teardown failures at drop time go to the unhandled-error hook.
#[derive(Debug)]
pub struct SubscriptionGuard {
    subscription: Option<Subscription>,
}

impl SubscriptionGuard {
    /// The guarded subscription.
    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Release the subscription without unsubscribing it.
    #[must_use]
    pub fn disarm(mut self) -> Option<Subscription> {
        self.subscription.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe_or_report();
        }
    }
}

fn execute(teardown: Teardown, errors: &mut Vec<TeardownError>) {
    match teardown {
        Teardown::Empty => {}
        Teardown::Callback(f) => {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
                errors.push(TeardownError::from_panic(payload));
            }
        }
        Teardown::Fallible(f) => match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(TeardownError::Failed(err)),
            Err(payload) => errors.push(TeardownError::from_panic(payload)),
        },
        Teardown::Subscription(child) => {
            if let Err(err) = child.unsubscribe() {
                errors.extend(err.into_errors());
            }
        }
    }
}

/// Run a teardown that has no owning node left to report through.
fn run_detached(teardown: Teardown) {
    let mut errors = Vec::new();
    execute(teardown, &mut errors);
    if !errors.is_empty() {
        report_unhandled_error(UnhandledError::Teardown(UnsubscriptionError::new(errors)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RxConfig;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl FnOnce() + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move || handle.set(handle.get() + 1))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn unsubscribe_is_idempotent() {
        let sub = Subscription::new();
        let (count, f) = counter();
        sub.add_fn(f);
        sub.unsubscribe().unwrap();
        sub.unsubscribe().unwrap();
        sub.unsubscribe().unwrap();
        assert_eq!(count.get(), 1);
        assert!(sub.closed());
    }

    #[test]
    fn finalizers_run_in_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = Subscription::new_with(Teardown::from_fn({
            let log = Rc::clone(&log);
            move || log.borrow_mut().push(0)
        }));
        for i in 1..=3 {
            let log = Rc::clone(&log);
            sub.add_fn(move || log.borrow_mut().push(i));
        }
        sub.unsubscribe().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn closed_is_visible_inside_finalizer() {
        let sub = Subscription::new();
        let seen = Rc::new(Cell::new(false));
        let (probe, seen_clone) = (sub.clone(), Rc::clone(&seen));
        sub.add_fn(move || {
            seen_clone.set(probe.closed());
            // Re-entrant unsubscribe must be a no-op.
            probe.unsubscribe().unwrap();
        });
        sub.unsubscribe().unwrap();
        assert!(seen.get());
    }

    #[test]
    fn add_on_closed_runs_immediately() {
        let sub = Subscription::new();
        sub.unsubscribe().unwrap();
        let (count, f) = counter();
        assert_eq!(sub.add_fn(f), TeardownKey::None);
        assert_eq!(count.get(), 1);
        assert_eq!(sub.finalizer_count(), 0);
    }

    #[test]
    fn add_failure_on_closed_goes_to_hook() {
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let _guard = RxConfig::new()
            .with_unhandled_error_hook(move |_| hits_clone.set(hits_clone.get() + 1))
            .install();
        let sub = Subscription::empty();
        sub.add_fallible(|| Err("late".into()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn self_add_is_noop() {
        let sub = Subscription::new();
        assert_eq!(sub.add(&sub), TeardownKey::None);
        assert_eq!(sub.finalizer_count(), 0);
        sub.unsubscribe().unwrap();
    }

    // =========================================================================
    // Tree
    // =========================================================================

    #[test]
    fn child_unsubscribed_directly_detaches_from_parent() {
        let parent = Subscription::new();
        let child = Subscription::new();
        let (count, f) = counter();
        child.add_fn(f);
        parent.add(&child);
        assert_eq!(parent.finalizer_count(), 1);
        assert_eq!(child.parent_count(), 1);

        child.unsubscribe().unwrap();
        assert_eq!(parent.finalizer_count(), 0);
        parent.unsubscribe().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn child_with_two_parents_runs_once() {
        let a = Subscription::new();
        let b = Subscription::new();
        let child = Subscription::new();
        let (count, f) = counter();
        child.add_fn(f);
        a.add(&child);
        b.add(&child);
        assert_eq!(child.parent_count(), 2);

        a.unsubscribe().unwrap();
        assert_eq!(b.finalizer_count(), 0);
        b.unsubscribe().unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn duplicate_child_add_registers_once() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(&child);
        parent.add(&child);
        assert_eq!(parent.finalizer_count(), 1);
    }

    #[test]
    fn closed_child_is_ignored() {
        let parent = Subscription::new();
        let child = Subscription::empty();
        assert_eq!(parent.add(&child), TeardownKey::None);
        assert_eq!(parent.finalizer_count(), 0);
    }

    #[test]
    fn remove_skips_execution() {
        let sub = Subscription::new();
        let (count, f) = counter();
        let key = sub.add_fn(f);
        sub.remove(key);
        sub.unsubscribe().unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn remove_child_clears_back_reference() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(&child);
        parent.remove(&child);
        assert_eq!(child.parent_count(), 0);
        parent.unsubscribe().unwrap();
        assert!(!child.closed());
    }

    #[test]
    fn parent_cascades_to_children() {
        let root = Subscription::new();
        let mid = Subscription::new();
        let leaf = Subscription::new();
        root.add(&mid);
        mid.add(&leaf);
        root.unsubscribe().unwrap();
        assert!(mid.closed());
        assert!(leaf.closed());
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn failures_are_aggregated_after_all_run() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = Subscription::new();
        let l1 = Rc::clone(&log);
        sub.add_fn(move || l1.borrow_mut().push("f1"));
        let l2 = Rc::clone(&log);
        sub.add_fallible(move || {
            l2.borrow_mut().push("f2");
            Err("boom".into())
        });
        let l3 = Rc::clone(&log);
        sub.add_fn(move || l3.borrow_mut().push("f3"));

        let err = sub.unsubscribe().unwrap_err();
        assert_eq!(*log.borrow(), vec!["f1", "f2", "f3"]);
        let messages: Vec<String> = err.errors().iter().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["boom"]);
    }

    #[test]
    fn panicking_finalizer_is_captured() {
        let sub = Subscription::new();
        let (count, f) = counter();
        sub.add_fn(|| panic!("kaboom"));
        sub.add_fn(f);
        let err = sub.unsubscribe().unwrap_err();
        assert_eq!(count.get(), 1);
        assert!(matches!(&err.errors()[0], TeardownError::Panicked(msg) if msg == "kaboom"));
    }

    #[test]
    fn nested_failures_are_flattened() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add_fallible(|| Err("a".into()));
        child.add_fallible(|| Err("b".into()));
        child.add_fallible(|| Err("c".into()));
        parent.add(&child);
        parent.add_fallible(|| Err("d".into()));

        let err = parent.unsubscribe().unwrap_err();
        let messages: Vec<String> = err.errors().iter().map(ToString::to_string).collect();
        assert_eq!(messages, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let sub = Subscription::new();
        let (count, f) = counter();
        sub.add_fn(f);
        {
            let _guard = sub.clone().into_guard();
        }
        assert_eq!(count.get(), 1);

        let other = Subscription::new();
        let released = other.clone().into_guard().disarm().unwrap();
        assert!(!released.closed());
        assert_eq!(released, other);
    }
}
