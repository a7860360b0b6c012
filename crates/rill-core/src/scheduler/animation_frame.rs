#![forbid(unsafe_code)]

//! Frame-batched scheduler.
//!
//! Zero-delay work is collected and run together in the next host frame.
//! Work scheduled (or rescheduled) while a frame batch is running lands in
//! the following frame, so a self-rescheduling action runs once per frame.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::host::{FrameHost, FrameId, TimerHost};
use super::timed::set_timer;
use super::{Scheduler, Work};
use crate::subscription::Subscription;

struct Pending {
    work: Work,
    handle: Subscription,
}

struct FrameInner {
    timers: Rc<dyn TimerHost>,
    frames: Rc<dyn FrameHost>,
    pending: RefCell<Vec<Pending>>,
    requested: Cell<Option<FrameId>>,
}

/// Runs work on host animation frames.
#[derive(Clone)]
pub struct AnimationFrameScheduler {
    inner: Rc<FrameInner>,
}

impl AnimationFrameScheduler {
    /// Create a scheduler using `frames` for batching and `timers` for delays.
    pub fn new(timers: Rc<dyn TimerHost>, frames: Rc<dyn FrameHost>) -> Self {
        Self {
            inner: Rc::new(FrameInner {
                timers,
                frames,
                pending: RefCell::new(Vec::new()),
                requested: Cell::new(None),
            }),
        }
    }

    /// Number of actions waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }
}

impl std::fmt::Debug for AnimationFrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationFrameScheduler")
            .field("pending", &self.pending())
            .field("frame_requested", &self.inner.requested.get().is_some())
            .finish()
    }
}

impl FrameInner {
    fn enqueue(self: &Rc<Self>, work: Work, handle: Subscription) {
        self.pending.borrow_mut().push(Pending { work, handle });
        if self.requested.get().is_none() {
            let inner = Rc::clone(self);
            let id = self
                .frames
                .request_frame(Box::new(move |timestamp| inner.run_frame(timestamp)));
            self.requested.set(Some(id));
        }
    }

    fn defer(self: &Rc<Self>, work: Work, handle: Subscription, delay: Duration) {
        let inner = Rc::clone(self);
        let owner = handle.clone();
        set_timer(&self.timers, &handle, delay, move || inner.enqueue(work, owner));
    }

    fn run_frame(self: &Rc<Self>, timestamp: Duration) {
        self.requested.set(None);
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        tracing::trace!(?timestamp, actions = batch.len(), "animation frame");
        for Pending { mut work, handle } in batch {
            if handle.closed() {
                continue;
            }
            match work() {
                None => handle.unsubscribe_or_report(),
                Some(_) if handle.closed() => {}
                Some(delay) if delay.is_zero() => self.enqueue(work, handle),
                Some(delay) => self.defer(work, handle, delay),
            }
        }
    }
}

impl Scheduler for AnimationFrameScheduler {
    fn now(&self) -> Duration {
        self.inner.timers.current_time()
    }

    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription {
        let handle = Subscription::new();
        if delay.is_zero() {
            self.inner.enqueue(work, handle.clone());
        } else {
            self.inner.defer(work, handle.clone(), delay);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Continuation, SchedulerExt, VirtualTimeScheduler};

    fn scheduler(vts: &VirtualTimeScheduler) -> AnimationFrameScheduler {
        AnimationFrameScheduler::new(Rc::new(vts.clone()), Rc::new(vts.clone()))
    }

    #[test]
    fn zero_delay_work_batches_into_one_frame() {
        let vts = VirtualTimeScheduler::new();
        let frames = scheduler(&vts);
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let (log, clock) = (Rc::clone(&log), vts.clone());
            frames.schedule_fn(Duration::ZERO, move || log.borrow_mut().push((tag, clock.frame())));
        }
        assert_eq!(frames.pending(), 2);
        vts.flush().unwrap();
        assert_eq!(*log.borrow(), vec![("a", 16), ("b", 16)]);
    }

    #[test]
    fn rescheduling_runs_once_per_frame() {
        let vts = VirtualTimeScheduler::new();
        let frames = scheduler(&vts);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (seen_clone, clock) = (Rc::clone(&seen), vts.clone());
        frames.schedule(0_u32, Duration::ZERO, move |n| {
            seen_clone.borrow_mut().push(clock.frame());
            if n < 2 {
                Continuation::Reschedule {
                    state: n + 1,
                    delay: Duration::ZERO,
                }
            } else {
                Continuation::Done
            }
        });
        vts.flush().unwrap();
        assert_eq!(*seen.borrow(), vec![16, 32, 48]);
    }

    #[test]
    fn delayed_work_waits_for_timer_then_frame() {
        let vts = VirtualTimeScheduler::new();
        let frames = scheduler(&vts);
        let ran_at = Rc::new(Cell::new(None));
        let (ran_clone, clock) = (Rc::clone(&ran_at), vts.clone());
        frames.schedule_fn(Duration::from_millis(20), move || ran_clone.set(Some(clock.frame())));
        vts.flush().unwrap();
        assert_eq!(ran_at.get(), Some(32));
    }
}
