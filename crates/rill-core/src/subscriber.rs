#![forbid(unsafe_code)]

//! Observer wrapper enforcing the notification grammar.
//!
//! Grammar: `next* (error | complete)?`. A [`Subscriber`] forwards to its destination
//! until the first terminal notification, then stops, drops the destination,
//! and unsubscribes itself. Everything delivered after that is dropped and
//! reported to the stopped-notification hook.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::report_stopped_notification;
use crate::notification::NotificationKind;
use crate::observer::Observer;
use crate::subscription::{Subscription, Teardown, TeardownKey};

struct SubscriberInner<T, E> {
    subscription: Subscription,
    stopped: Cell<bool>,
    destination: RefCell<Option<Rc<dyn Observer<T, E>>>>,
}

/// An observer with lifecycle control. Cloning shares the same subscriber.
pub struct Subscriber<T, E> {
    inner: Rc<SubscriberInner<T, E>>,
}

impl<T, E> Clone for Subscriber<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Subscriber<T, E> {
    /// Wrap `destination`.
    pub fn new(destination: impl Observer<T, E> + 'static) -> Self {
        Self::from_rc(Rc::new(destination))
    }

    /// Wrap an already shared destination.
    pub fn from_rc(destination: Rc<dyn Observer<T, E>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<SubscriberInner<T, E>>| {
            let weak = weak.clone();
            SubscriberInner {
                subscription: Subscription::new_with(Teardown::from_fn(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.stopped.set(true);
                        let released = inner.destination.borrow_mut().take();
                        drop(released);
                    }
                })),
                stopped: Cell::new(false),
                destination: RefCell::new(Some(destination)),
            }
        });
        Self { inner }
    }
}

impl<T, E> Subscriber<T, E> {
    fn destination(&self) -> Option<Rc<dyn Observer<T, E>>> {
        self.inner.destination.borrow().clone()
    }

    /// Deliver a value unless stopped.
    pub fn next(&self, value: T) {
        if self.inner.stopped.get() {
            report_stopped_notification(NotificationKind::Next);
            return;
        }
        if let Some(destination) = self.destination() {
            destination.next(value);
        }
    }

    /// Deliver a failure unless stopped, then unsubscribe.
    pub fn error(&self, err: E) {
        if self.inner.stopped.replace(true) {
            report_stopped_notification(NotificationKind::Error);
            return;
        }
        if let Some(destination) = self.destination() {
            destination.error(err);
        }
        self.inner.subscription.unsubscribe_or_report();
    }

    /// Deliver completion unless stopped, then unsubscribe.
    pub fn complete(&self) {
        if self.inner.stopped.replace(true) {
            report_stopped_notification(NotificationKind::Complete);
            return;
        }
        if let Some(destination) = self.destination() {
            destination.complete();
        }
        self.inner.subscription.unsubscribe_or_report();
    }

    /// Whether a terminal notification arrived or the subscriber was
    /// unsubscribed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Whether the underlying subscription is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.subscription.closed()
    }

    /// The subscription owning everything this subscriber holds.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.inner.subscription
    }

    /// Register a finalizer on this subscriber.
    pub fn add(&self, teardown: impl Into<Teardown>) -> TeardownKey {
        self.inner.subscription.add(teardown)
    }

    /// Unregister a finalizer without running it.
    pub fn remove(&self, key: impl Into<TeardownKey>) {
        self.inner.subscription.remove(key);
    }

    /// Stop and tear down. Failures go to the unhandled-error hook.
    pub fn unsubscribe(&self) {
        self.inner.subscription.unsubscribe_or_report();
    }
}

impl<T, E> Observer<T, E> for Subscriber<T, E> {
    fn next(&self, value: T) {
        Subscriber::next(self, value);
    }

    fn error(&self, err: E) {
        Subscriber::error(self, err);
    }

    fn complete(&self) {
        Subscriber::complete(self);
    }
}

impl<T, E> From<Subscriber<T, E>> for Teardown {
    fn from(subscriber: Subscriber<T, E>) -> Self {
        Teardown::Subscription(subscriber.inner.subscription.clone())
    }
}

impl<T, E> From<&Subscriber<T, E>> for Teardown {
    fn from(subscriber: &Subscriber<T, E>) -> Self {
        Teardown::Subscription(subscriber.inner.subscription.clone())
    }
}

impl<T, E> fmt::Debug for Subscriber<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("stopped", &self.inner.stopped.get())
            .field("subscription", &self.inner.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RxConfig;
    use crate::observer::FnObserver;

    fn recording() -> (Rc<RefCell<Vec<String>>>, FnObserver<u32, String>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
        let observer = FnObserver::new()
            .on_next(move |v| a.borrow_mut().push(format!("next:{v}")))
            .on_error(move |e| b.borrow_mut().push(format!("error:{e}")))
            .on_complete(move || c.borrow_mut().push("complete".into()));
        (log, observer)
    }

    #[test]
    fn terminal_exclusivity() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer);
        subscriber.next(1);
        subscriber.complete();
        subscriber.next(2);
        subscriber.error("late".into());
        subscriber.complete();
        assert_eq!(*log.borrow(), vec!["next:1", "complete"]);
        assert!(subscriber.is_stopped());
        assert!(subscriber.closed());
    }

    #[test]
    fn error_unsubscribes_owned_resources() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer);
        let torn_down = Rc::new(Cell::new(false));
        let flag = Rc::clone(&torn_down);
        subscriber.add(Teardown::from_fn(move || flag.set(true)));
        subscriber.error("boom".into());
        assert!(torn_down.get());
        assert_eq!(*log.borrow(), vec!["error:boom"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (log, observer) = recording();
        let subscriber = Subscriber::new(observer);
        subscriber.unsubscribe();
        subscriber.next(1);
        assert!(log.borrow().is_empty());
        assert!(subscriber.is_stopped());
    }

    #[test]
    fn stopped_notifications_reach_hook() {
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let kinds_clone = Rc::clone(&kinds);
        let _guard = RxConfig::new()
            .with_stopped_notification_hook(move |kind| kinds_clone.borrow_mut().push(kind))
            .install();
        let (_log, observer) = recording();
        let subscriber = Subscriber::new(observer);
        subscriber.complete();
        subscriber.next(1);
        subscriber.error("x".into());
        assert_eq!(
            *kinds.borrow(),
            vec![NotificationKind::Next, NotificationKind::Error]
        );
    }

    #[test]
    fn reentrant_complete_from_next_delivers_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slot: Rc<RefCell<Option<Subscriber<u32, String>>>> = Rc::new(RefCell::new(None));
        let (l1, l2, s1) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&slot));
        let observer = FnObserver::new()
            .on_next(move |v: u32| {
                l1.borrow_mut().push(format!("next:{v}"));
                let me = s1.borrow().clone();
                if let Some(me) = me {
                    me.complete();
                    me.complete();
                }
            })
            .on_complete(move || l2.borrow_mut().push("complete".into()));
        let subscriber = Subscriber::new(observer);
        *slot.borrow_mut() = Some(subscriber.clone());
        subscriber.next(1);
        subscriber.next(2);
        assert_eq!(*log.borrow(), vec!["next:1", "complete"]);
        slot.borrow_mut().take();
    }

    #[test]
    fn destination_released_after_terminal() {
        let (_log, observer) = recording();
        let observer = Rc::new(observer);
        let subscriber = Subscriber::from_rc(Rc::clone(&observer) as Rc<dyn Observer<u32, String>>);
        assert_eq!(Rc::strong_count(&observer), 2);
        subscriber.complete();
        assert_eq!(Rc::strong_count(&observer), 1);
    }
}
