#![forbid(unsafe_code)]

//! Trampolining scheduler.
//!
//! Zero-delay work scheduled while the queue is idle runs immediately inside
//! a drain loop; work scheduled while a drain is active is appended and runs
//! after the current item, never nested. The loop is iterative, so recursive
//! scheduling does not grow the stack.
//!
//! An optional time budget bounds a single drain: once exceeded, the loop
//! yields to the host with a zero-delay timer and resumes there.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use super::host::TimerHost;
use super::timed::set_timer;
use super::{Scheduler, Work};
use crate::subscription::Subscription;

/// Tuning for [`QueueScheduler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSchedulerConfig {
    /// Maximum wall time one drain may run before yielding to the host.
    /// `None` drains to completion.
    pub time_budget: Option<Duration>,
}

impl QueueSchedulerConfig {
    /// Set the drain time budget.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }
}

struct Queued {
    work: Work,
    handle: Subscription,
}

struct QueueInner {
    host: Rc<dyn TimerHost>,
    config: QueueSchedulerConfig,
    queue: RefCell<VecDeque<Queued>>,
    draining: Cell<bool>,
    yield_pending: Cell<bool>,
}

/// Restores the draining flag even if a work item panics.
struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Recursion-guarded FIFO scheduler.
#[derive(Clone)]
pub struct QueueScheduler {
    inner: Rc<QueueInner>,
}

impl QueueScheduler {
    /// Create a queue scheduler with default tuning.
    pub fn new(host: Rc<dyn TimerHost>) -> Self {
        Self::with_config(host, QueueSchedulerConfig::default())
    }

    /// Create a queue scheduler with explicit tuning.
    pub fn with_config(host: Rc<dyn TimerHost>, config: QueueSchedulerConfig) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                host,
                config,
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                yield_pending: Cell::new(false),
            }),
        }
    }

    /// Whether a drain loop is currently running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.get()
    }

    /// Number of queued items (including cancelled ones not yet skipped).
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queue.borrow().len()
    }
}

impl std::fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("config", &self.inner.config)
            .field("queued", &self.queued())
            .field("draining", &self.is_draining())
            .finish()
    }
}

impl QueueInner {
    fn enqueue(self: &Rc<Self>, work: Work, handle: Subscription) {
        self.queue.borrow_mut().push_back(Queued { work, handle });
        if !self.draining.get() {
            self.drain();
        }
    }

    fn defer(self: &Rc<Self>, work: Work, handle: Subscription, delay: Duration) {
        let inner = Rc::clone(self);
        let owner = handle.clone();
        set_timer(&self.host, &handle, delay, move || inner.enqueue(work, owner));
    }

    fn drain(self: &Rc<Self>) {
        self.draining.set(true);
        let _guard = DrainGuard {
            flag: &self.draining,
        };
        let started = Instant::now();
        let mut ran = 0_usize;
        loop {
            let Some(Queued { mut work, handle }) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            if handle.closed() {
                continue;
            }
            ran += 1;
            match work() {
                None => handle.unsubscribe_or_report(),
                Some(delay) if handle.closed() => {
                    tracing::trace!(?delay, "continuation dropped: handle closed");
                }
                Some(delay) if delay.is_zero() => {
                    self.queue.borrow_mut().push_back(Queued { work, handle });
                }
                Some(delay) => self.defer(work, handle, delay),
            }
            if let Some(budget) = self.config.time_budget
                && started.elapsed() >= budget
                && !self.queue.borrow().is_empty()
            {
                self.schedule_yield();
                break;
            }
        }
        tracing::trace!(ran, remaining = self.queue.borrow().len(), "queue drain finished");
    }

    fn schedule_yield(self: &Rc<Self>) {
        if self.yield_pending.replace(true) {
            return;
        }
        let inner = Rc::clone(self);
        self.host.set_timeout(
            Duration::ZERO,
            Box::new(move || {
                inner.yield_pending.set(false);
                if !inner.draining.get() {
                    inner.drain();
                }
            }),
        );
    }
}

impl Scheduler for QueueScheduler {
    fn now(&self) -> Duration {
        self.inner.host.current_time()
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
    use crate::scheduler::{SchedulerExt, VirtualTimeScheduler};
    use std::panic::{self, AssertUnwindSafe};

    fn scheduler() -> (VirtualTimeScheduler, QueueScheduler) {
        let vts = VirtualTimeScheduler::new();
        let queue = QueueScheduler::new(Rc::new(vts.clone()));
        (vts, queue)
    }

    #[test]
    fn nested_work_runs_after_current_item() {
        let (_vts, queue) = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (outer_log, inner_queue) = (Rc::clone(&log), queue.clone());
        queue.schedule_fn(Duration::ZERO, move || {
            outer_log.borrow_mut().push("outer:start");
            let nested_log = Rc::clone(&outer_log);
            inner_queue.schedule_fn(Duration::ZERO, move || nested_log.borrow_mut().push("nested"));
            outer_log.borrow_mut().push("outer:end");
        });
        assert_eq!(*log.borrow(), vec!["outer:start", "outer:end", "nested"]);
        assert!(!queue.is_draining());
    }

    #[test]
    fn cancelled_queued_work_is_skipped() {
        let (_vts, queue) = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (outer_log, inner_queue) = (Rc::clone(&log), queue.clone());
        queue.schedule_fn(Duration::ZERO, move || {
            let nested_log = Rc::clone(&outer_log);
            let handle = inner_queue
                .schedule_fn(Duration::ZERO, move || nested_log.borrow_mut().push("nested"));
            handle.unsubscribe().unwrap();
        });
        assert!(log.borrow().is_empty());
        assert_eq!(queue.queued(), 0);
    }

    #[test]
    fn draining_flag_restored_after_panic() {
        let (_vts, queue) = scheduler();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.schedule_fn(Duration::ZERO, || panic!("work failed"));
        }));
        assert!(result.is_err());
        assert!(!queue.is_draining());

        let ran = Rc::new(Cell::new(false));
        let ran_clone = Rc::clone(&ran);
        queue.schedule_fn(Duration::ZERO, move || ran_clone.set(true));
        assert!(ran.get());
    }

    #[test]
    fn delayed_work_goes_through_host() {
        let (vts, queue) = scheduler();
        let ran_at = Rc::new(Cell::new(None));
        let (ran_clone, clock) = (Rc::clone(&ran_at), vts.clone());
        queue.schedule_fn(Duration::from_millis(12), move || ran_clone.set(Some(clock.frame())));
        assert_eq!(ran_at.get(), None);
        vts.flush().unwrap();
        assert_eq!(ran_at.get(), Some(12));
    }

    #[test]
    fn exhausted_budget_yields_to_host() {
        let vts = VirtualTimeScheduler::new();
        let queue = QueueScheduler::with_config(
            Rc::new(vts.clone()),
            QueueSchedulerConfig::default().with_time_budget(Duration::ZERO),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let (outer_log, inner_queue) = (Rc::clone(&log), queue.clone());
        queue.schedule_fn(Duration::ZERO, move || {
            outer_log.borrow_mut().push(1);
            let nested_log = Rc::clone(&outer_log);
            inner_queue.schedule_fn(Duration::ZERO, move || nested_log.borrow_mut().push(2));
        });
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(queue.queued(), 1);
        vts.flush().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }
}
