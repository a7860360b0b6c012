#![forbid(unsafe_code)]

//! Error taxonomy for the reactive runtime.
//!
//! Ordinary stream failures never appear here: they travel through the
//! stream's own error type `E` and reach observers via `error()`. The types
//! in this module cover the places where the runtime itself must report a
//! failure to a caller.
//!
//! | Type | Raised by | Meaning |
//! |------|-----------|---------|
//! | [`TeardownError`] | one finalizer | a fallible finalizer returned `Err` or panicked |
//! | [`UnsubscriptionError`] | `Subscription::unsubscribe` | every finalizer ran; these failed, in order |
//! | [`SchedulerError`] | `VirtualTimeScheduler::flush` | the frame ceiling or the per-frame action budget was crossed |
//! | [`UnhandledError`] | configuration hook | a failure with no caller left to receive it |

use std::any::Any;
use std::fmt;

/// Boxed error returned by fallible finalizers.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Failure of a single finalizer during teardown.
#[derive(Debug)]
pub enum TeardownError {
    /// A fallible finalizer returned an error.
    Failed(BoxError),
    /// A finalizer panicked. The panic payload message is preserved.
    Panicked(String),
}

impl TeardownError {
    /// Wrap a plain message as a finalizer failure.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::Panicked(msg) => write!(f, "finalizer panicked: {msg}"),
        }
    }
}

impl std::error::Error for TeardownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(err) => Some(err.as_ref()),
            Self::Panicked(_) => None,
        }
    }
}

/// Aggregate of every finalizer failure collected during one `unsubscribe()`.
///
/// Errors keep the order in which the failing finalizers ran. Failures from
/// nested subscriptions are flattened into this list rather than nested.
#[derive(Debug)]
pub struct UnsubscriptionError {
    errors: Vec<TeardownError>,
}

impl UnsubscriptionError {
    /// Build an aggregate from collected failures.
    #[must_use]
    pub fn new(errors: Vec<TeardownError>) -> Self {
        Self { errors }
    }

    /// The collected failures, in execution order.
    #[must_use]
    pub fn errors(&self) -> &[TeardownError] {
        &self.errors
    }

    /// Consume the aggregate, returning the collected failures.
    #[must_use]
    pub fn into_errors(self) -> Vec<TeardownError> {
        self.errors
    }

    /// Number of failed finalizers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether the aggregate holds no failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for UnsubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s) occurred during unsubscription:",
            self.errors.len()
        )?;
        for (idx, err) in self.errors.iter().enumerate() {
            write!(f, "\n  {}) {err}", idx + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for UnsubscriptionError {}

/// Failures raised by a scheduler's execution loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Virtual time reached an action due past the configured ceiling.
    ///
    /// This is the infinite-loop guard: a flush that would otherwise keep
    /// rescheduling forever stops here. The offending action stays queued.
    FrameLimitExceeded {
        /// The configured ceiling.
        max_frames: i64,
        /// Due frame of the first action past the ceiling.
        due_frame: i64,
    },
    /// Too many actions ran without the clock moving.
    ///
    /// Guards against work that keeps rescheduling itself with a zero delay.
    /// The next action stays queued.
    ActionLimitExceeded {
        /// The configured per-frame budget.
        max_actions: usize,
        /// Frame the clock was stuck at.
        frame: i64,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameLimitExceeded {
                max_frames,
                due_frame,
            } => write!(
                f,
                "virtual time exceeded {max_frames} frames (next action due at frame {due_frame})"
            ),
            Self::ActionLimitExceeded { max_actions, frame } => write!(
                f,
                "virtual time ran {max_actions} actions at frame {frame} without advancing"
            ),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// A failure that has no caller left to receive it.
///
/// These are handed to the unhandled-error hook of the active
/// [`RxConfig`](crate::config::RxConfig).
#[derive(Debug)]
pub enum UnhandledError {
    /// A producer failed after its subscriber had already stopped.
    Producer(String),
    /// An error notification reached an observer without an error handler.
    Stream(String),
    /// Teardown failed where no caller could observe the result, e.g. the
    /// self-unsubscribe that follows a terminal notification.
    Teardown(UnsubscriptionError),
}

impl fmt::Display for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer(msg) => write!(f, "producer failed after subscriber stopped: {msg}"),
            Self::Stream(msg) => write!(f, "unhandled stream error: {msg}"),
            Self::Teardown(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for UnhandledError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Teardown(err) => Some(err),
            _ => None,
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
