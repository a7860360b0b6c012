#![forbid(unsafe_code)]

//! Lazy producers and operator composition.
//!
//! An [`Observable`] wraps a producer function that runs once per
//! subscription with a fresh [`Subscriber`]. The producer returns the
//! teardown for whatever it started; returning `Err` routes the failure to the
//! subscriber's error path, so `subscribe()` itself never fails.
//!
//! Operators are plain functions `Observable<T, E> -> Observable<R, E>`,
//! applied with [`Observable::pipe`] and usually built with [`operate`] and
//! [`OperatorSubscriber`].

mod creation;
mod operate;

pub use creation::{empty, from_iter, interval, never, of, throw_error, timer};
pub use operate::{OperatorSubscriber, operate};

use std::fmt;
use std::rc::Rc;

use crate::config::report_unhandled_error;
use crate::error::UnhandledError;
use crate::observer::{FnObserver, Observer};
use crate::subscriber::Subscriber;
use crate::subscription::{Subscription, Teardown};

type Producer<T, E> = dyn Fn(&Subscriber<T, E>) -> Result<Teardown, E>;

/// A lazy, re-subscribable stream description.
pub struct Observable<T, E> {
    producer: Rc<Producer<T, E>>,
}

impl<T, E> Clone for Observable<T, E> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
        }
    }
}

impl<T, E> fmt::Debug for Observable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T, E> AsRef<Observable<T, E>> for Observable<T, E> {
    fn as_ref(&self) -> &Observable<T, E> {
        self
    }
}

impl<T: 'static, E: fmt::Debug + 'static> Observable<T, E> {
    /// Create an observable from a producer.
    pub fn new(producer: impl Fn(&Subscriber<T, E>) -> Result<Teardown, E> + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
        }
    }

    /// Subscribe an observer, returning the subscription that cancels it.
    pub fn subscribe(&self, observer: impl Observer<T, E> + 'static) -> Subscription {
        let subscriber = Subscriber::new(observer);
        self.subscribe_subscriber(&subscriber);
        subscriber.subscription().clone()
    }

    /// Subscribe with a value handler only.
    pub fn subscribe_next(&self, next: impl Fn(T) + 'static) -> Subscription {
        self.subscribe(FnObserver::from_next(next))
    }

    /// Run the producer against an existing subscriber.
    ///
    /// The producer's teardown is registered on the subscriber. If the
    /// subscriber already stopped synchronously, the teardown runs at once.
    pub fn subscribe_subscriber(&self, subscriber: &Subscriber<T, E>) {
        match (self.producer)(subscriber) {
            Ok(teardown) => {
                subscriber.add(teardown);
            }
            Err(err) if subscriber.is_stopped() => {
                report_unhandled_error(UnhandledError::Producer(format!("{err:?}")));
            }
            Err(err) => subscriber.error(err),
        }
    }

    /// Apply an operator.
    pub fn pipe<R>(&self, operator: impl FnOnce(Observable<T, E>) -> R) -> R {
        operator(self.clone())
    }

    /// Build a derived observable.
    ///
    /// `init` runs once per downstream subscription with this source and the
    /// downstream subscriber; it typically subscribes an
    /// [`OperatorSubscriber`] to the source. An `Err` from `init` is routed to
    /// the downstream subscriber.
    pub fn lift<R: 'static>(
        &self,
        init: impl Fn(&Observable<T, E>, &Subscriber<R, E>) -> Result<(), E> + 'static,
    ) -> Observable<R, E> {
        let source = self.clone();
        Observable::new(move |subscriber: &Subscriber<R, E>| {
            init(&source, subscriber)?;
            Ok(Teardown::Empty)
        })
    }
}
