#![forbid(unsafe_code)]

use std::rc::Rc;
use std::time::Duration;

use super::host::TimerHost;
use super::timed::run_timed;
use super::{Scheduler, Work};
use crate::subscription::Subscription;

/// Runs zero-delay work inline, during `schedule_work`.
///
/// Zero-delay continuations loop inline as well; the first positive delay
/// hands the rest of the chain to the host timer.
#[derive(Clone)]
pub struct ImmediateScheduler {
    host: Rc<dyn TimerHost>,
}

impl ImmediateScheduler {
    /// Create a scheduler using `host` for delayed work.
    pub fn new(host: Rc<dyn TimerHost>) -> Self {
        Self { host }
    }
}

impl std::fmt::Debug for ImmediateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmediateScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        self.host.current_time()
    }

    fn schedule_work(&self, mut work: Work, delay: Duration) -> Subscription {
        let handle = Subscription::new();
        if !delay.is_zero() {
            run_timed(Rc::clone(&self.host), handle.clone(), work, delay);
            return handle;
        }
        loop {
            match work() {
                None => break,
                Some(next) if next.is_zero() => continue,
                Some(next) => {
                    run_timed(Rc::clone(&self.host), handle.clone(), work, next);
                    return handle;
                }
            }
        }
        handle.unsubscribe_or_report();
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Continuation, SchedulerExt, VirtualTimeScheduler};
    use std::cell::RefCell;

    #[test]
    fn zero_delay_runs_inline() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = ImmediateScheduler::new(Rc::new(vts.clone()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let handle =
            scheduler.schedule_fn(Duration::ZERO, move || log_clone.borrow_mut().push("ran"));
        assert_eq!(*log.borrow(), vec!["ran"]);
        assert!(handle.closed());
        assert_eq!(vts.pending(), 0);
    }

    #[test]
    fn zero_delay_continuations_loop_inline() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = ImmediateScheduler::new(Rc::new(vts.clone()));
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        scheduler.schedule(0_u32, Duration::ZERO, move |n| {
            *count_clone.borrow_mut() += 1;
            if n < 4 {
                Continuation::Reschedule {
                    state: n + 1,
                    delay: Duration::ZERO,
                }
            } else {
                Continuation::Done
            }
        });
        assert_eq!(*count.borrow(), 5);
    }

    #[test]
    fn positive_delay_uses_host_timer() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = ImmediateScheduler::new(Rc::new(vts.clone()));
        let ran_at = Rc::new(RefCell::new(None));
        let (ran_clone, clock) = (Rc::clone(&ran_at), vts.clone());
        let handle = scheduler.schedule_fn(Duration::from_millis(7), move || {
            *ran_clone.borrow_mut() = Some(clock.frame());
        });
        assert!(ran_at.borrow().is_none());
        vts.flush().unwrap();
        assert_eq!(*ran_at.borrow(), Some(7));
        assert!(handle.closed());
    }

    #[test]
    fn cancel_before_timer_prevents_run() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = ImmediateScheduler::new(Rc::new(vts.clone()));
        let ran = Rc::new(RefCell::new(false));
        let ran_clone = Rc::clone(&ran);
        let handle = scheduler.schedule_fn(Duration::from_millis(3), move || {
            *ran_clone.borrow_mut() = true
        });
        handle.unsubscribe().unwrap();
        vts.flush().unwrap();
        assert!(!*ran.borrow());
    }
}
