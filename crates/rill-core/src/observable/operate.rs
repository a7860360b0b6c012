#![forbid(unsafe_code)]

//! Operator construction helpers.

use std::fmt;

use super::Observable;
use crate::observer::Observer;
use crate::subscriber::Subscriber;
use crate::subscription::Teardown;

/// Turn an `init` function into an operator usable with [`Observable::pipe`].
///
/// ```
/// use rill_core::{Observable, OperatorSubscriber, of, operate};
///
/// fn double() -> impl FnOnce(Observable<i32, ()>) -> Observable<i32, ()> {
///     operate(|source: &Observable<i32, ()>, destination| {
///         source.subscribe_subscriber(
///             &OperatorSubscriber::new(destination, |v: i32, out| out.next(v * 2)).build(),
///         );
///         Ok(())
///     })
/// }
///
/// let doubled = of::<i32, ()>(vec![1, 2]).pipe(double());
/// doubled.subscribe_next(|v| println!("{v}"));
/// ```
pub fn operate<T, R, E, F>(init: F) -> impl FnOnce(Observable<T, E>) -> Observable<R, E>
where
    T: 'static,
    R: 'static,
    E: fmt::Debug + 'static,
    F: Fn(&Observable<T, E>, &Subscriber<R, E>) -> Result<(), E> + 'static,
{
    move |source: Observable<T, E>| source.lift(init)
}

type NextHandler<T, R, E> = Box<dyn Fn(T, &Subscriber<R, E>)>;
type ErrorHandler<R, E> = Box<dyn Fn(E, &Subscriber<R, E>)>;
type CompleteHandler<R, E> = Box<dyn Fn(&Subscriber<R, E>)>;

/// Builder for the upstream subscriber of an operator.
///
/// Unset error and completion handlers forward to the destination. The built
/// subscriber is registered as a child of the destination, so downstream
/// unsubscription cascades upstream.
pub struct OperatorSubscriber<T, R, E> {
    destination: Subscriber<R, E>,
    on_next: NextHandler<T, R, E>,
    on_error: Option<ErrorHandler<R, E>>,
    on_complete: Option<CompleteHandler<R, E>>,
    on_finalize: Option<Box<dyn FnOnce()>>,
}

impl<T: 'static, R: 'static, E: 'static> OperatorSubscriber<T, R, E> {
    /// Start building with a value handler.
    pub fn new(
        destination: &Subscriber<R, E>,
        on_next: impl Fn(T, &Subscriber<R, E>) + 'static,
    ) -> Self {
        Self {
            destination: destination.clone(),
            on_next: Box::new(on_next),
            on_error: None,
            on_complete: None,
            on_finalize: None,
        }
    }

    /// Override the error handler.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(E, &Subscriber<R, E>) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Override the completion handler.
    #[must_use]
    pub fn on_complete(mut self, f: impl Fn(&Subscriber<R, E>) + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Run `f` when the upstream subscription is torn down, for any reason.
    #[must_use]
    pub fn on_finalize(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_finalize = Some(Box::new(f));
        self
    }

    /// Produce the upstream subscriber.
    pub fn build(self) -> Subscriber<T, E> {
        let Self {
            destination,
            on_next,
            on_error,
            on_complete,
            on_finalize,
        } = self;
        let parent = destination.clone();
        let subscriber = Subscriber::new(OperatorObserver {
            destination,
            on_next,
            on_error,
            on_complete,
        });
        if let Some(finalize) = on_finalize {
            subscriber.add(Teardown::from_fn(finalize));
        }
        parent.add(&subscriber);
        subscriber
    }
}

struct OperatorObserver<T, R, E> {
    destination: Subscriber<R, E>,
    on_next: NextHandler<T, R, E>,
    on_error: Option<ErrorHandler<R, E>>,
    on_complete: Option<CompleteHandler<R, E>>,
}

impl<T, R, E> Observer<T, E> for OperatorObserver<T, R, E> {
    fn next(&self, value: T) {
        (self.on_next)(value, &self.destination);
    }

    fn error(&self, err: E) {
        match &self.on_error {
            Some(handler) => handler(err, &self.destination),
            None => self.destination.error(err),
        }
    }

    fn complete(&self) {
        match &self.on_complete {
            Some(handler) => handler(&self.destination),
            None => self.destination.complete(),
        }
    }
}
