#![forbid(unsafe_code)]

//! Deterministic scheduler over a virtual clock.
//!
//! Actions are kept in a map ordered by `(due_frame, insertion_index)`, so
//! actions due at the same frame run in FIFO order. The clock only moves
//! when actions run (or when [`VirtualTimeScheduler::advance_to`] is called)
//! and never moves backwards.
//!
//! One frame is one millisecond of virtual time. Due frames may be negative:
//! hot test observables schedule events that happened "before" frame zero.
//!
//! # Infinite-loop guard
//!
//! [`flush`](VirtualTimeScheduler::flush) stops with
//! [`SchedulerError::FrameLimitExceeded`] as soon as the next action is due
//! past the configured ceiling. The offending action stays queued.
//! Work that reschedules itself with a zero delay never moves the clock, so
//! a second budget caps how many actions may run at one frame; crossing it
//! yields [`SchedulerError::ActionLimitExceeded`].
//!
//! # Host adapters
//!
//! The scheduler also implements [`TimerHost`] and [`FrameHost`], so any
//! host-driven policy can be run on virtual time.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::host::{FrameHost, FrameId, TimerHost, TimerId};
use super::{Scheduler, Work, once};
use crate::error::SchedulerError;
use crate::subscription::Subscription;

/// A point on the virtual clock.
pub type Frame = i64;

/// Convert a duration to whole frames, saturating.
#[must_use]
pub fn duration_to_frames(duration: Duration) -> Frame {
    Frame::try_from(duration.as_millis()).unwrap_or(Frame::MAX)
}

/// Convert a frame count to a duration. Negative counts clamp to zero.
#[must_use]
pub fn frames_to_duration(frames: Frame) -> Duration {
    Duration::from_millis(u64::try_from(frames).unwrap_or(0))
}

/// Configuration for [`VirtualTimeScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTimeConfig {
    /// Highest due frame `flush` will execute.
    pub max_frames: Frame,
    /// Spacing of virtual animation frames.
    pub animation_frame_interval: Frame,
    /// Most actions `flush` will run before the clock moves.
    pub max_actions_per_frame: usize,
}

impl Default for VirtualTimeConfig {
    fn default() -> Self {
        Self {
            max_frames: 10_000,
            animation_frame_interval: 16,
            max_actions_per_frame: 100_000,
        }
    }
}

impl VirtualTimeConfig {
    /// Set the frame ceiling.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: Frame) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Set the per-frame action budget.
    #[must_use]
    pub fn with_max_actions_per_frame(mut self, max_actions: usize) -> Self {
        self.max_actions_per_frame = max_actions.max(1);
        self
    }

    /// Set the virtual animation frame spacing.
    #[must_use]
    pub fn with_animation_frame_interval(mut self, interval: Frame) -> Self {
        self.animation_frame_interval = interval.max(1);
        self
    }
}

type ActionKey = (Frame, u64);

struct VirtualAction {
    work: Work,
    handle: Subscription,
    key: Rc<Cell<ActionKey>>,
}

struct VirtualState {
    frame: Frame,
    next_index: u64,
    actions: BTreeMap<ActionKey, VirtualAction>,
    timers: HashMap<u64, Subscription>,
    next_timer: u64,
    /// Frame the action budget is counting for, and actions run there.
    budget: (Frame, usize),
}

struct VirtualInner {
    state: RefCell<VirtualState>,
    max_frames: Cell<Frame>,
    max_actions_per_frame: usize,
    animation_frame_interval: Frame,
}

/// Virtual-clock scheduler. Cloning shares the same clock and queue.
#[derive(Clone)]
pub struct VirtualTimeScheduler {
    inner: Rc<VirtualInner>,
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualTimeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualTimeScheduler")
            .field("frame", &self.frame())
            .field("pending", &self.pending())
            .field("max_frames", &self.max_frames())
            .finish()
    }
}

impl VirtualTimeScheduler {
    /// Scheduler at frame zero with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(VirtualTimeConfig::default())
    }

    /// Scheduler at frame zero with explicit configuration.
    #[must_use]
    pub fn with_config(config: VirtualTimeConfig) -> Self {
        Self {
            inner: Rc::new(VirtualInner {
                state: RefCell::new(VirtualState {
                    frame: 0,
                    next_index: 0,
                    actions: BTreeMap::new(),
                    timers: HashMap::new(),
                    next_timer: 0,
                    budget: (0, 0),
                }),
                max_frames: Cell::new(config.max_frames),
                max_actions_per_frame: config.max_actions_per_frame.max(1),
                animation_frame_interval: config.animation_frame_interval.max(1),
            }),
        }
    }

    /// Current virtual frame.
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.inner.state.borrow().frame
    }

    /// Current frame ceiling.
    #[must_use]
    pub fn max_frames(&self) -> Frame {
        self.inner.max_frames.get()
    }

    /// Change the frame ceiling, returning the previous one.
    pub fn set_max_frames(&self, max_frames: Frame) -> Frame {
        self.inner.max_frames.replace(max_frames)
    }

    /// Number of queued actions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.borrow().actions.len()
    }

    /// Due frame of the earliest queued action.
    #[must_use]
    pub fn next_due(&self) -> Option<Frame> {
        self.inner
            .state
            .borrow()
            .actions
            .keys()
            .next()
            .map(|(due, _)| *due)
    }

    /// Schedule `work` at an absolute frame.
    pub fn schedule_at(&self, due: Frame, work: Work) -> Subscription {
        let handle = Subscription::new();
        let key = Rc::new(Cell::new((due, 0)));
        let weak: Weak<VirtualInner> = Rc::downgrade(&self.inner);
        let cancel_key = Rc::clone(&key);
        handle.add_fn(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.state.borrow_mut().actions.remove(&cancel_key.get());
                drop(removed);
            }
        });
        self.insert(
            due,
            VirtualAction {
                work,
                handle: handle.clone(),
                key,
            },
        );
        handle
    }

    /// Schedule `work` `delay` frames from now. Negative delays are allowed.
    pub fn schedule_in(&self, delay: Frame, work: Work) -> Subscription {
        self.schedule_at(self.frame().saturating_add(delay), work)
    }

    /// Schedule a one-shot closure at an absolute frame.
    pub fn schedule_once_at(&self, due: Frame, f: impl FnOnce() + 'static) -> Subscription {
        self.schedule_at(due, once(f))
    }

    /// Schedule a one-shot closure `delay` frames from now.
    pub fn schedule_once_in(&self, delay: Frame, f: impl FnOnce() + 'static) -> Subscription {
        self.schedule_in(delay, once(f))
    }

    fn insert(&self, due: Frame, action: VirtualAction) {
        let mut state = self.inner.state.borrow_mut();
        let key = (due, state.next_index);
        state.next_index += 1;
        action.key.set(key);
        state.actions.insert(key, action);
    }

    /// Pop the earliest action due at or before `limit`, advancing the clock.
    fn pop_due(&self, limit: Frame) -> Result<Option<VirtualAction>, SchedulerError> {
        let mut state = self.inner.state.borrow_mut();
        let Some(&(due, index)) = state.actions.keys().next() else {
            return Ok(None);
        };
        if due > limit {
            return Ok(None);
        }
        let max_frames = self.inner.max_frames.get();
        if due > max_frames {
            return Err(SchedulerError::FrameLimitExceeded {
                max_frames,
                due_frame: due,
            });
        }
        let frame = state.frame.max(due);
        let used = if state.budget.0 == frame {
            state.budget.1
        } else {
            0
        };
        let max_actions = self.inner.max_actions_per_frame;
        if used >= max_actions {
            return Err(SchedulerError::ActionLimitExceeded { max_actions, frame });
        }
        state.budget = (frame, used + 1);
        let action = state.actions.remove(&(due, index));
        state.frame = frame;
        Ok(action)
    }

    fn reset_budget(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.budget = (state.frame, 0);
    }

    fn run(&self, mut action: VirtualAction) {
        if action.handle.closed() {
            return;
        }
        match (action.work)() {
            None => action.handle.unsubscribe_or_report(),
            Some(_) if action.handle.closed() => {}
            Some(delay) => {
                let due = self.frame().saturating_add(duration_to_frames(delay));
                self.insert(due, action);
            }
        }
    }

    /// Run every queued action, including those scheduled while flushing.
    ///
    /// Fails when the next action is due past the frame ceiling, or when
    /// the per-frame action budget runs out. A panic in an action propagates
    /// to the caller.
    pub fn flush(&self) -> Result<(), SchedulerError> {
        let span = tracing::debug_span!("virtual_time.flush", start = self.frame());
        let _entered = span.enter();
        self.reset_budget();
        let mut executed = 0_usize;
        while let Some(action) = self.pop_due(Frame::MAX)? {
            self.run(action);
            executed += 1;
        }
        tracing::debug!(executed, frame = self.frame(), "virtual time flushed");
        Ok(())
    }

    /// Run actions due at or before `target`, then move the clock to
    /// `target` (if it is ahead).
    pub fn advance_to(&self, target: Frame) -> Result<(), SchedulerError> {
        self.reset_budget();
        while let Some(action) = self.pop_due(target)? {
            self.run(action);
        }
        let mut state = self.inner.state.borrow_mut();
        state.frame = state.frame.max(target);
        Ok(())
    }

    /// Advance the clock by `frames`.
    pub fn advance_by(&self, frames: Frame) -> Result<(), SchedulerError> {
        self.advance_to(self.frame().saturating_add(frames))
    }

    fn register_timer(&self, due: Frame, callback: impl FnOnce() + 'static) -> u64 {
        let id = {
            let mut state = self.inner.state.borrow_mut();
            state.next_timer += 1;
            state.next_timer
        };
        let weak: Weak<VirtualInner> = Rc::downgrade(&self.inner);
        let handle = self.schedule_once_at(due, move || {
            if let Some(inner) = weak.upgrade() {
                let fired = inner.state.borrow_mut().timers.remove(&id);
                drop(fired);
            }
            callback();
        });
        self.inner.state.borrow_mut().timers.insert(id, handle);
        id
    }

    fn cancel_timer(&self, id: u64) {
        let handle = self.inner.state.borrow_mut().timers.remove(&id);
        if let Some(handle) = handle {
            handle.unsubscribe_or_report();
        }
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        frames_to_duration(self.frame())
    }

    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription {
        self.schedule_in(duration_to_frames(delay), work)
    }
}

impl TimerHost for VirtualTimeScheduler {
    fn current_time(&self) -> Duration {
        frames_to_duration(self.frame())
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let due = self.frame().saturating_add(duration_to_frames(delay));
        TimerId(self.register_timer(due, callback))
    }

    fn clear_timeout(&self, id: TimerId) {
        self.cancel_timer(id.0);
    }
}

impl FrameHost for VirtualTimeScheduler {
    fn request_frame(&self, callback: Box<dyn FnOnce(Duration)>) -> FrameId {
        let interval = self.inner.animation_frame_interval;
        let due = (self.frame().div_euclid(interval) + 1).saturating_mul(interval);
        FrameId(self.register_timer(due, move || callback(frames_to_duration(due))))
    }

    fn cancel_frame(&self, id: FrameId) {
        self.cancel_timer(id.0);
    }
}
