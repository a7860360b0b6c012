#![forbid(unsafe_code)]

//! Consumer side of a stream.

use std::fmt;
use std::rc::Rc;

use crate::config::report_unhandled_error;
use crate::error::UnhandledError;

/// Receives the notifications of one stream.
///
/// Implementations take `&self`; use interior mutability for state.
pub trait Observer<T, E> {
    /// A value was produced.
    fn next(&self, value: T);
    /// The stream failed. No further notifications follow.
    fn error(&self, err: E);
    /// The stream finished. No further notifications follow.
    fn complete(&self);
}

impl<T, E, O: Observer<T, E> + ?Sized> Observer<T, E> for Rc<O> {
    fn next(&self, value: T) {
        (**self).next(value);
    }

    fn error(&self, err: E) {
        (**self).error(err);
    }

    fn complete(&self) {
        (**self).complete();
    }
}

/// Observer assembled from independent closures.
///
/// Unset handlers are no-ops, except `error`, which reports to the
/// unhandled-error hook so failures are never silently lost.
///
/// ```
/// use rill_core::FnObserver;
/// use rill_core::Observer;
///
/// let observer = FnObserver::<u32, String>::new()
///     .on_next(|v| println!("got {v}"))
///     .on_complete(|| println!("done"));
/// observer.next(1);
/// observer.complete();
/// ```
pub struct FnObserver<T, E> {
    next: Box<dyn Fn(T)>,
    error: Box<dyn Fn(E)>,
    complete: Box<dyn Fn()>,
}

impl<T: 'static, E: fmt::Debug + 'static> FnObserver<T, E> {
    /// Observer with default handlers in every slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Box::new(|_| {}),
            error: Box::new(|err: E| {
                report_unhandled_error(UnhandledError::Stream(format!("{err:?}")));
            }),
            complete: Box::new(|| {}),
        }
    }

    /// Observer that only handles values.
    #[must_use]
    pub fn from_next(f: impl Fn(T) + 'static) -> Self {
        Self::new().on_next(f)
    }
}

impl<T, E> FnObserver<T, E> {
    /// Set the value handler.
    #[must_use]
    pub fn on_next(mut self, f: impl Fn(T) + 'static) -> Self {
        self.next = Box::new(f);
        self
    }

    /// Set the error handler.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(E) + 'static) -> Self {
        self.error = Box::new(f);
        self
    }

    /// Set the completion handler.
    #[must_use]
    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.complete = Box::new(f);
        self
    }
}

impl<T: 'static, E: fmt::Debug + 'static> Default for FnObserver<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for FnObserver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}

impl<T, E> Observer<T, E> for FnObserver<T, E> {
    fn next(&self, value: T) {
        (self.next)(value);
    }

    fn error(&self, err: E) {
        (self.error)(err);
    }

    fn complete(&self) {
        (self.complete)();
    }
}
