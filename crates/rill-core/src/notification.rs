#![forbid(unsafe_code)]

//! Reified stream events.

use std::fmt;

use crate::observer::Observer;

/// One of the three events an observer can receive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Notification<T, E> {
    /// A value.
    Next(T),
    /// Terminal failure.
    Error(E),
    /// Terminal success.
    Complete,
}

/// The kind of a [`Notification`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Next,
    Error,
    Complete,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
        };
        f.write_str(label)
    }
}

impl<T, E> Notification<T, E> {
    /// Kind of this notification.
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Next(_) => NotificationKind::Next,
            Self::Error(_) => NotificationKind::Error,
            Self::Complete => NotificationKind::Complete,
        }
    }

    /// Whether this notification ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }

    /// Deliver this notification to `observer`, consuming it.
    pub fn deliver(self, observer: &dyn Observer<T, E>) {
        match self {
            Self::Next(value) => observer.next(value),
            Self::Error(err) => observer.error(err),
            Self::Complete => observer.complete(),
        }
    }

    /// Map the value of a `Next` notification.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Notification<U, E> {
        match self {
            Self::Next(value) => Notification::Next(f(value)),
            Self::Error(err) => Notification::Error(err),
            Self::Complete => Notification::Complete,
        }
    }
}

impl<T: Clone, E: Clone> Notification<T, E> {
    /// Deliver a copy of this notification to `observer`.
    pub fn observe(&self, observer: &dyn Observer<T, E>) {
        self.clone().deliver(observer);
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Display for Notification<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next(value) => write!(f, "next({value:?})"),
            Self::Error(err) => write!(f, "error({err:?})"),
            Self::Complete => f.write_str("complete"),
        }
    }
}
