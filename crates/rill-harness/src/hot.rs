#![forbid(unsafe_code)]

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use rill_core::scheduler::VirtualTimeScheduler;
use rill_core::{Observable, Subject, Subscriber, Teardown};

use crate::marble::TestMessage;
use crate::subscription_log::SubscriptionLogs;

/// Multicast test double on one absolute timeline.
///
/// Messages are scheduled once, by [`setup`](HotObservable::setup), and
/// broadcast through a [`Subject`]; a subscriber only sees messages at or
/// after its own subscribe frame.
pub struct HotObservable<T, E> {
    messages: Rc<Vec<TestMessage<T, E>>>,
    logs: SubscriptionLogs,
    subject: Subject<T, E>,
    observable: Observable<T, E>,
    scheduler: VirtualTimeScheduler,
    armed: Rc<Cell<bool>>,
}

impl<T, E> Clone for HotObservable<T, E> {
    fn clone(&self) -> Self {
        Self {
            messages: Rc::clone(&self.messages),
            logs: self.logs.clone(),
            subject: self.subject.clone(),
            observable: self.observable.clone(),
            scheduler: self.scheduler.clone(),
            armed: Rc::clone(&self.armed),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for HotObservable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotObservable")
            .field("messages", &self.messages)
            .field("subscriptions", &self.logs.snapshot())
            .field("armed", &self.armed.get())
            .finish()
    }
}

impl<T, E> HotObservable<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    /// Hot observable playing `messages` on `scheduler` once set up.
    pub fn new(messages: Vec<TestMessage<T, E>>, scheduler: VirtualTimeScheduler) -> Self {
        let subject = Subject::new();
        let logs = SubscriptionLogs::new();
        let (source, log, clock) = (subject.clone(), logs.clone(), scheduler.clone());
        let observable = Observable::new(move |subscriber: &Subscriber<T, E>| {
            let index = log.log_subscribed(clock.frame());
            let (log, end_clock) = (log.clone(), clock.clone());
            subscriber.add(Teardown::from_fn(move || {
                log.log_unsubscribed(index, end_clock.frame());
            }));
            source.as_observable().subscribe_subscriber(subscriber);
            Ok(Teardown::Empty)
        });
        Self {
            messages: Rc::new(messages),
            logs,
            subject,
            observable,
            scheduler,
            armed: Rc::new(Cell::new(false)),
        }
    }

    /// Schedule every message relative to the current frame. Runs once;
    /// later calls are no-ops.
    pub fn setup(&self) {
        if self.armed.replace(true) {
            return;
        }
        for message in self.messages.iter() {
            let subject = self.subject.clone();
            let notification = message.notification.clone();
            self.scheduler
                .schedule_once_in(message.frame, move || notification.deliver(&subject));
        }
        tracing::trace!(messages = self.messages.len(), "hot observable armed");
    }
}

impl<T, E> HotObservable<T, E> {
    /// Parsed messages.
    #[must_use]
    pub fn messages(&self) -> &[TestMessage<T, E>] {
        &self.messages
    }

    /// Live subscription log.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionLogs {
        self.logs.clone()
    }

    /// The observable to subscribe to.
    #[must_use]
    pub fn observable(&self) -> Observable<T, E> {
        self.observable.clone()
    }

    /// Whether [`setup`](Self::setup) already ran.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }
}

impl<T, E> AsRef<Observable<T, E>> for HotObservable<T, E> {
    fn as_ref(&self) -> &Observable<T, E> {
        &self.observable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription_log::SubscriptionLog;
    use rill_core::FnObserver;
    use std::cell::RefCell;

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let vts = VirtualTimeScheduler::new();
        let hot: HotObservable<char, String> = HotObservable::new(
            vec![
                TestMessage::next(2, 'a'),
                TestMessage::next(5, 'b'),
                TestMessage::complete(8),
            ],
            vts.clone(),
        );
        hot.setup();
        hot.setup();
        assert_eq!(vts.pending(), 3);

        let early = Rc::new(RefCell::new(Vec::new()));
        let late = Rc::new(RefCell::new(Vec::new()));
        let early_sink = Rc::clone(&early);
        hot.observable()
            .subscribe_next(move |v| early_sink.borrow_mut().push(v));
        let (observable, late_sink) = (hot.observable(), Rc::clone(&late));
        vts.schedule_once_at(4, move || {
            observable.subscribe(
                FnObserver::new().on_next(move |v: char| late_sink.borrow_mut().push(v)),
            );
        });
        vts.flush().unwrap();

        assert_eq!(*early.borrow(), vec!['a', 'b']);
        assert_eq!(*late.borrow(), vec!['b']);
        assert_eq!(
            hot.subscriptions().snapshot(),
            vec![SubscriptionLog::closed(0, 8), SubscriptionLog::closed(4, 8)]
        );
    }

    #[test]
    fn subscribing_after_completion_logs_instant_span() {
        let vts = VirtualTimeScheduler::new();
        let hot: HotObservable<char, String> =
            HotObservable::new(vec![TestMessage::complete(1)], vts.clone());
        hot.setup();
        vts.flush().unwrap();
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        hot.observable()
            .subscribe(FnObserver::new().on_complete(move || flag.set(true)));
        assert!(done.get());
        assert_eq!(hot.subscriptions().snapshot(), vec![SubscriptionLog::closed(1, 1)]);
    }
}
