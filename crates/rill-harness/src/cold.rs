#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use rill_core::scheduler::VirtualTimeScheduler;
use rill_core::{Observable, Subscriber, Teardown};

use crate::marble::TestMessage;
use crate::subscription_log::SubscriptionLogs;

/// Replays its messages, relative to the subscribe frame, for every
/// subscriber independently.
pub struct ColdObservable<T, E> {
    messages: Rc<Vec<TestMessage<T, E>>>,
    logs: SubscriptionLogs,
    observable: Observable<T, E>,
}

impl<T, E> Clone for ColdObservable<T, E> {
    fn clone(&self) -> Self {
        Self {
            messages: Rc::clone(&self.messages),
            logs: self.logs.clone(),
            observable: self.observable.clone(),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for ColdObservable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColdObservable")
            .field("messages", &self.messages)
            .field("subscriptions", &self.logs.snapshot())
            .finish()
    }
}

impl<T, E> ColdObservable<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    /// Cold observable playing `messages` on `scheduler`.
    pub fn new(messages: Vec<TestMessage<T, E>>, scheduler: VirtualTimeScheduler) -> Self {
        let messages = Rc::new(messages);
        let logs = SubscriptionLogs::new();
        let (replay, log) = (Rc::clone(&messages), logs.clone());
        let observable = Observable::new(move |subscriber: &Subscriber<T, E>| {
            let index = log.log_subscribed(scheduler.frame());
            tracing::trace!(
                frame = scheduler.frame(),
                messages = replay.len(),
                "cold observable subscribed"
            );
            for message in replay.iter() {
                let target = subscriber.clone();
                let notification = message.notification.clone();
                subscriber.add(scheduler.schedule_once_in(message.frame, move || {
                    notification.deliver(&target)
                }));
            }
            let (log, clock) = (log.clone(), scheduler.clone());
            Ok(Teardown::from_fn(move || {
                log.log_unsubscribed(index, clock.frame());
            }))
        });
        Self {
            messages,
            logs,
            observable,
        }
    }
}

impl<T, E> ColdObservable<T, E> {
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
}

impl<T, E> AsRef<Observable<T, E>> for ColdObservable<T, E> {
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

    fn cold(vts: &VirtualTimeScheduler) -> ColdObservable<char, String> {
        ColdObservable::new(
            vec![
                TestMessage::next(1, 'a'),
                TestMessage::next(3, 'b'),
                TestMessage::complete(4),
            ],
            vts.clone(),
        )
    }

    fn record(
        vts: &VirtualTimeScheduler,
        source: &Observable<char, String>,
        log: &Rc<RefCell<Vec<(i64, String)>>>,
    ) -> rill_core::Subscription {
        let (a, b, clock, clock2) = (Rc::clone(log), Rc::clone(log), vts.clone(), vts.clone());
        source.subscribe(
            FnObserver::new()
                .on_next(move |v: char| a.borrow_mut().push((clock.frame(), v.to_string())))
                .on_complete(move || b.borrow_mut().push((clock2.frame(), "|".into()))),
        )
    }

    #[test]
    fn each_subscription_gets_a_shifted_copy() {
        let vts = VirtualTimeScheduler::new();
        let source = cold(&vts);
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));
        record(&vts, &source.observable(), &first);
        let (observable, vts2, second2) = (source.observable(), vts.clone(), Rc::clone(&second));
        vts.schedule_once_at(2, move || {
            record(&vts2, &observable, &second2);
        });
        vts.flush().unwrap();

        let frames = |log: &Rc<RefCell<Vec<(i64, String)>>>| log.borrow().clone();
        assert_eq!(
            frames(&first),
            vec![(1, "a".into()), (3, "b".into()), (4, "|".into())]
        );
        assert_eq!(
            frames(&second),
            vec![(3, "a".into()), (5, "b".into()), (6, "|".into())]
        );
        assert_eq!(
            source.subscriptions().snapshot(),
            vec![SubscriptionLog::closed(0, 4), SubscriptionLog::closed(2, 6)]
        );
    }

    #[test]
    fn unsubscribe_cancels_pending_messages() {
        let vts = VirtualTimeScheduler::new();
        let source = cold(&vts);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = record(&vts, &source.observable(), &log);
        vts.advance_to(2).unwrap();
        sub.unsubscribe().unwrap();
        assert_eq!(vts.pending(), 0);
        vts.flush().unwrap();
        assert_eq!(*log.borrow(), vec![(1, "a".to_string())]);
        assert_eq!(source.subscriptions().snapshot(), vec![SubscriptionLog::closed(0, 2)]);
    }
}
