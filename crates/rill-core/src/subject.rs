#![forbid(unsafe_code)]

//! Multicast stream: one producer, many subscribers.
//!
//! Broadcasts iterate over a snapshot of the observer list taken when the
//! notification arrives, so observers subscribing or unsubscribing during a
//! broadcast do not disturb delivery to the others.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::notification::Notification;
use crate::observable::Observable;
use crate::observer::Observer;
use crate::subscriber::Subscriber;
use crate::subscription::Teardown;

enum Terminal<E> {
    Error(E),
    Complete,
}

struct SubjectState<T, E> {
    observers: Vec<(u64, Subscriber<T, E>)>,
    next_id: u64,
    terminal: Option<Terminal<E>>,
}

/// A hot multicast [`Observable`] that is also an [`Observer`].
pub struct Subject<T, E> {
    state: Rc<RefCell<SubjectState<T, E>>>,
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, E> fmt::Debug for Subject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Subject")
            .field("observers", &state.observers.len())
            .field("stopped", &state.terminal.is_some())
            .finish()
    }
}

impl<T, E> Default for Subject<T, E> {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }
}

impl<T, E> Subject<T, E> {
    /// Create a subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Whether a terminal notification has been broadcast.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.borrow().terminal.is_some()
    }

    fn snapshot(&self) -> Vec<Subscriber<T, E>> {
        self.state
            .borrow()
            .observers
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }
}

impl<T: Clone, E: Clone> Subject<T, E> {
    /// Broadcast a value.
    pub fn next(&self, value: T) {
        if self.is_stopped() {
            return;
        }
        for observer in self.snapshot() {
            observer.next(value.clone());
        }
    }

    /// Broadcast a failure and release all observers.
    pub fn error(&self, err: E) {
        let observers = {
            let mut state = self.state.borrow_mut();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(Terminal::Error(err.clone()));
            std::mem::take(&mut state.observers)
        };
        for (_, observer) in observers {
            observer.error(err.clone());
        }
    }

    /// Broadcast completion and release all observers.
    pub fn complete(&self) {
        let observers = {
            let mut state = self.state.borrow_mut();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(Terminal::Complete);
            std::mem::take(&mut state.observers)
        };
        for (_, observer) in observers {
            observer.complete();
        }
    }
}

impl<T: Clone + 'static, E: Clone + fmt::Debug + 'static> Subject<T, E> {
    /// The subscribe side of this subject.
    ///
    /// Subscribers arriving after termination receive the terminal
    /// notification immediately.
    #[must_use]
    pub fn as_observable(&self) -> Observable<T, E> {
        let state = Rc::clone(&self.state);
        Observable::new(move |subscriber: &Subscriber<T, E>| {
            let replay = match &state.borrow().terminal {
                Some(Terminal::Error(err)) => Some(Notification::Error(err.clone())),
                Some(Terminal::Complete) => Some(Notification::Complete),
                None => None,
            };
            if let Some(terminal) = replay {
                terminal.deliver(subscriber);
                return Ok(Teardown::Empty);
            }
            let id = {
                let mut guard = state.borrow_mut();
                let id = guard.next_id;
                guard.next_id += 1;
                guard.observers.push((id, subscriber.clone()));
                id
            };

            let weak: Weak<RefCell<SubjectState<T, E>>> = Rc::downgrade(&state);
            Ok(Teardown::from_fn(move || {
                if let Some(state) = weak.upgrade() {
                    let removed = {
                        let mut state = state.borrow_mut();
                        let pos = state.observers.iter().position(|(oid, _)| *oid == id);
                        pos.map(|pos| state.observers.remove(pos))
                    };
                    drop(removed);
                }
            }))
        })
    }
}

impl<T: Clone, E: Clone> Observer<T, E> for Subject<T, E> {
    fn next(&self, value: T) {
        Subject::next(self, value);
    }

    fn error(&self, err: E) {
        Subject::error(self, err);
    }

    fn complete(&self) {
        Subject::complete(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::FnObserver;
    use crate::subscription::Subscription;
    use std::cell::Cell;

    fn log_observer(
        tag: &'static str,
        log: &Rc<RefCell<Vec<String>>>,
    ) -> FnObserver<u8, String> {
        let (a, b, c) = (Rc::clone(log), Rc::clone(log), Rc::clone(log));
        FnObserver::new()
            .on_next(move |v| a.borrow_mut().push(format!("{tag}:{v}")))
            .on_error(move |e| b.borrow_mut().push(format!("{tag}:#{e}")))
            .on_complete(move || c.borrow_mut().push(format!("{tag}:|")))
    }

    #[test]
    fn broadcasts_to_all() {
        let subject = Subject::<u8, String>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        subject.as_observable().subscribe(log_observer("a", &log));
        subject.as_observable().subscribe(log_observer("b", &log));
        subject.next(1);
        subject.complete();
        assert_eq!(*log.borrow(), vec!["a:1", "b:1", "a:|", "b:|"]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn late_subscriber_gets_terminal() {
        let subject = Subject::<u8, String>::new();
        subject.error("gone".into());
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = subject.as_observable().subscribe(log_observer("late", &log));
        assert_eq!(*log.borrow(), vec!["late:#gone"]);
        assert!(sub.closed());
        subject.next(9);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unsubscribing_another_mid_broadcast_keeps_the_rest() {
        let subject = Subject::<u8, String>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let victim_slot = Rc::clone(&victim);
        let first_log = Rc::clone(&log);
        subject.as_observable().subscribe(FnObserver::<u8, String>::from_next(move |v| {
            first_log.borrow_mut().push(format!("a:{v}"));
            if let Some(sub) = victim_slot.borrow_mut().take() {
                sub.unsubscribe().unwrap();
            }
        }));
        *victim.borrow_mut() = Some(subject.as_observable().subscribe(log_observer("b", &log)));
        subject.as_observable().subscribe(log_observer("c", &log));

        subject.next(1);
        subject.next(2);
        assert_eq!(*log.borrow(), vec!["a:1", "c:1", "a:2", "c:2"]);
        assert_eq!(subject.observer_count(), 2);
    }

    #[test]
    fn subscribing_mid_broadcast_waits_for_next_value() {
        let subject = Subject::<u8, String>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(Cell::new(false));
        let (inner_subject, inner_log, flag) =
            (subject.clone(), Rc::clone(&log), Rc::clone(&added));
        subject.as_observable().subscribe(FnObserver::<u8, String>::from_next(move |_| {
            if !flag.replace(true) {
                inner_subject.as_observable().subscribe(log_observer("late", &inner_log));
            }
        }));
        subject.next(1);
        subject.next(2);
        assert_eq!(*log.borrow(), vec!["late:2"]);
    }
}
