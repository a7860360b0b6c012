#![forbid(unsafe_code)]

//! Units of work and the policies that decide when they run.
//!
//! Every policy implements [`Scheduler`]: a clock plus `schedule_work`, which
//! returns a [`Subscription`] handle. Unsubscribing the handle before the
//! work runs prevents it from running; unsubscribing during a continuation
//! chain stops further rescheduling.
//!
//! Work is a closure returning `Some(delay)` to run again after `delay`, or
//! `None` when finished. [`SchedulerExt::schedule`] offers the typed form
//! with explicit state and a [`Continuation`].
//!
//! | Policy | Zero delay | Positive delay |
//! |--------|------------|----------------|
//! | [`ImmediateScheduler`] | inline, during `schedule` | host timer |
//! | [`QueueScheduler`] | trampolined, FIFO | host timer, then queued |
//! | [`DeferredScheduler`] | host timer | host timer |
//! | [`AnimationFrameScheduler`] | next host frame | host timer, then next frame |
//! | [`VirtualTimeScheduler`] | virtual queue | virtual queue |
//!
//! Timer and frame primitives come from [`TimerHost`] / [`FrameHost`]. A
//! [`VirtualTimeScheduler`] implements both, so any policy can run on
//! virtual time in tests; [`RunLoop`] implements both on a real clock.

mod animation_frame;
mod deferred;
mod host;
mod immediate;
mod queue;
mod run_loop;
mod timed;
mod virtual_time;

pub use animation_frame::AnimationFrameScheduler;
pub use deferred::DeferredScheduler;
pub use host::{FrameHost, FrameId, TimerHost, TimerId};
pub use immediate::ImmediateScheduler;
pub use queue::{QueueScheduler, QueueSchedulerConfig};
pub use run_loop::{RunLoop, RunLoopConfig, StepResult};
pub use virtual_time::{
    Frame, VirtualTimeConfig, VirtualTimeScheduler, duration_to_frames, frames_to_duration,
};

use std::rc::Rc;
use std::time::Duration;

use crate::subscription::Subscription;

/// Type-erased unit of work. Returns the delay before the next run, or
/// `None` when done.
pub type Work = Box<dyn FnMut() -> Option<Duration>>;

/// What a typed work function wants next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation<S> {
    /// Stop.
    Done,
    /// Run again with `state` after `delay`.
    Reschedule {
        /// State for the next run.
        state: S,
        /// Delay before the next run.
        delay: Duration,
    },
}

/// A policy for running units of work.
pub trait Scheduler {
    /// Current time on this scheduler's clock.
    fn now(&self) -> Duration;

    /// Schedule `work` to run after `delay`.
    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription;
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription {
        (**self).schedule_work(work, delay)
    }
}

/// Typed scheduling helpers available on every [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Schedule `work` with explicit state. The work may reschedule itself
    /// by returning [`Continuation::Reschedule`].
    fn schedule<S: 'static>(
        &self,
        state: S,
        delay: Duration,
        work: impl FnMut(S) -> Continuation<S> + 'static,
    ) -> Subscription {
        self.schedule_work(erase(state, work), delay)
    }

    /// Schedule a one-shot closure.
    fn schedule_fn(&self, delay: Duration, work: impl FnOnce() + 'static) -> Subscription {
        self.schedule_work(once(work), delay)
    }
}

impl<T: Scheduler + ?Sized> SchedulerExt for T {}

fn erase<S: 'static>(state: S, mut work: impl FnMut(S) -> Continuation<S> + 'static) -> Work {
    let mut slot = Some(state);
    Box::new(move || {
        let current = slot.take()?;
        match work(current) {
            Continuation::Done => None,
            Continuation::Reschedule { state, delay } => {
                slot = Some(state);
                Some(delay)
            }
        }
    })
}

/// Wrap a one-shot closure as [`Work`].
pub(crate) fn once(work: impl FnOnce() + 'static) -> Work {
    let mut slot = Some(work);
    Box::new(move || {
        if let Some(work) = slot.take() {
            work();
        }
        None
    })
}
