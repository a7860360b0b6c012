#![forbid(unsafe_code)]

//! Step-driven timer and frame host.
//!
//! [`RunLoop`] implements [`TimerHost`] and [`FrameHost`] without threads
//! or OS timers. The embedder calls [`RunLoop::step`] with a monotonic
//! timestamp, from its own loop or animation callback:
//!
//! ```text
//! host loop
//!   → step(now)          // fire due timers, then the frame batch if due
//!   → sleep / await      // until next_deadline(), owned by the host
//! ```
//!
//! The loop clock only moves on `step`, so the same sequence of timestamps
//! always fires the same callbacks in the same order. The loop never waits
//! on its own: [`RunLoop::run_until_idle`] steps against wall time and hands
//! every pause to a host-supplied `wait` callback.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use super::host::{FrameHost, FrameId, TimerHost, TimerId};

/// Tuning for [`RunLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLoopConfig {
    /// Longest pause `run_until_idle` asks the host for between steps.
    pub max_idle_wait: Duration,
    /// Minimum spacing between frame batches.
    pub frame_interval: Duration,
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            max_idle_wait: Duration::from_millis(50),
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl RunLoopConfig {
    /// Set the idle wait cap.
    #[must_use]
    pub fn with_max_idle_wait(mut self, wait: Duration) -> Self {
        self.max_idle_wait = wait;
        self
    }

    /// Set the frame spacing.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

/// Outcome of a single [`RunLoop::step`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepResult {
    /// Timer callbacks run in this step.
    pub timers_fired: u32,
    /// Frame callbacks run in this step.
    pub frames_fired: u32,
    /// Whether nothing is left pending after this step.
    pub idle: bool,
}

type TimerKey = (Duration, u64);

#[derive(Default)]
struct LoopState {
    timers: BTreeMap<TimerKey, Box<dyn FnOnce()>>,
    deadlines: HashMap<u64, Duration>,
    frames: Vec<(u64, Box<dyn FnOnce(Duration)>)>,
    last_frame: Option<Duration>,
    next_id: u64,
}

struct RunLoopInner {
    config: RunLoopConfig,
    epoch: Instant,
    now: Cell<Duration>,
    state: RefCell<LoopState>,
}

/// Host loop driven by explicit [`step`](RunLoop::step) calls.
/// Cloning shares the same loop.
#[derive(Clone)]
pub struct RunLoop {
    inner: Rc<RunLoopInner>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("RunLoop")
            .field("now", &self.inner.now.get())
            .field("timers", &state.timers.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

impl RunLoop {
    /// Loop with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunLoopConfig::default())
    }

    /// Loop with explicit tuning.
    #[must_use]
    pub fn with_config(config: RunLoopConfig) -> Self {
        Self {
            inner: Rc::new(RunLoopInner {
                config,
                epoch: Instant::now(),
                now: Cell::new(Duration::ZERO),
                state: RefCell::new(LoopState::default()),
            }),
        }
    }

    /// Wall time since the loop was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.epoch.elapsed()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.state.borrow().timers.len()
    }

    /// Number of pending frame callbacks.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.inner.state.borrow().frames.len()
    }

    /// Whether no timer or frame callback is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.borrow();
        state.timers.is_empty() && state.frames.is_empty()
    }

    /// Earliest loop time at which `step` has something to run.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        let state = self.inner.state.borrow();
        let timer = state.timers.keys().next().map(|(due, _)| *due);
        let frame = (!state.frames.is_empty()).then(|| match state.last_frame {
            Some(last) => last + self.inner.config.frame_interval,
            None => self.inner.now.get(),
        });
        match (timer, frame) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire due timers, then the pending frame batch if the frame interval
    /// has elapsed.
    ///
    /// `now` is a monotonic timestamp from the host clock; an earlier value
    /// than the previous step is treated as the previous one. Timers armed
    /// during this step wait for the next one, even with zero delay.
    pub fn step(&self, now: Duration) -> StepResult {
        let now = now.max(self.inner.now.get());
        self.inner.now.set(now);
        let mut result = StepResult::default();

        let armed_before = self.inner.state.borrow().next_id;
        while let Some(callback) = self.pop_due_timer(now, armed_before) {
            callback();
            result.timers_fired += 1;
        }

        let batch = {
            let mut state = self.inner.state.borrow_mut();
            let due = state
                .last_frame
                .is_none_or(|last| now.saturating_sub(last) >= self.inner.config.frame_interval);
            if due && !state.frames.is_empty() {
                state.last_frame = Some(now);
                std::mem::take(&mut state.frames)
            } else {
                Vec::new()
            }
        };
        for (_, callback) in batch {
            callback(now);
            result.frames_fired += 1;
        }

        result.idle = self.is_idle();
        if result.timers_fired > 0 || result.frames_fired > 0 {
            tracing::trace!(
                ?now,
                timers = result.timers_fired,
                frames = result.frames_fired,
                "run loop step"
            );
        }
        result
    }

    /// Step against wall time until nothing is pending. Between steps the
    /// host's `wait` is called with the time until the next deadline, capped
    /// at `max_idle_wait`. Returns the accumulated counts.
    pub fn run_until_idle(&self, mut wait: impl FnMut(Duration)) -> StepResult {
        let mut total = StepResult::default();
        loop {
            let step = self.step(self.elapsed());
            total.timers_fired += step.timers_fired;
            total.frames_fired += step.frames_fired;
            if step.idle {
                total.idle = true;
                return total;
            }
            let now = self.inner.now.get();
            let pause = self
                .next_deadline()
                .map_or(Duration::ZERO, |deadline| deadline.saturating_sub(now))
                .min(self.inner.config.max_idle_wait);
            if !pause.is_zero() {
                wait(pause);
            }
        }
    }

    fn pop_due_timer(&self, now: Duration, armed_before: u64) -> Option<Box<dyn FnOnce()>> {
        let mut state = self.inner.state.borrow_mut();
        let key = state
            .timers
            .keys()
            .find(|(due, id)| *due <= now && *id < armed_before)
            .copied()?;
        state.deadlines.remove(&key.1);
        state.timers.remove(&key)
    }

    fn next_id(state: &mut LoopState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }
}

impl TimerHost for RunLoop {
    fn current_time(&self) -> Duration {
        self.inner.now.get()
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let due = self.inner.now.get().saturating_add(delay);
        let mut state = self.inner.state.borrow_mut();
        let id = Self::next_id(&mut state);
        state.timers.insert((due, id), callback);
        state.deadlines.insert(id, due);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            state
                .deadlines
                .remove(&id.0)
                .and_then(|due| state.timers.remove(&(due, id.0)))
        };
        drop(removed);
    }
}

impl FrameHost for RunLoop {
    fn request_frame(&self, callback: Box<dyn FnOnce(Duration)>) -> FrameId {
        let mut state = self.inner.state.borrow_mut();
        let id = Self::next_id(&mut state);
        state.frames.push((id, callback));
        FrameId(id)
    }

    fn cancel_frame(&self, id: FrameId) {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            state
                .frames
                .iter()
                .position(|(frame_id, _)| *frame_id == id.0)
                .map(|pos| state.frames.remove(pos))
        };
        drop(removed);
    }
}
