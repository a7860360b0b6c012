#![forbid(unsafe_code)]

use std::rc::Rc;
use std::time::Duration;

use super::host::TimerHost;
use super::timed::run_timed;
use super::{Scheduler, Work};
use crate::subscription::Subscription;

/// Always defers through the host timer (macrotask semantics), honoring
/// `delay`. Zero-delay work still waits for the host to fire the timer.
#[derive(Clone)]
pub struct DeferredScheduler {
    host: Rc<dyn TimerHost>,
}

impl DeferredScheduler {
    /// Create a scheduler on `host`.
    pub fn new(host: Rc<dyn TimerHost>) -> Self {
        Self { host }
    }
}

impl std::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for DeferredScheduler {
    fn now(&self) -> Duration {
        self.host.current_time()
    }

    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription {
        let handle = Subscription::new();
        run_timed(Rc::clone(&self.host), handle.clone(), work, delay);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Continuation, SchedulerExt, VirtualTimeScheduler};
    use std::cell::RefCell;

    #[test]
    fn honors_delay_on_virtual_host() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = DeferredScheduler::new(Rc::new(vts.clone()));
        let ran_at = Rc::new(RefCell::new(None));
        let (ran_clone, clock) = (Rc::clone(&ran_at), vts.clone());
        scheduler.schedule_fn(Duration::from_millis(30), move || {
            *ran_clone.borrow_mut() = Some(clock.frame());
        });
        vts.flush().unwrap();
        assert_eq!(*ran_at.borrow(), Some(30));
    }

    #[test]
    fn zero_delay_is_not_inline() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = DeferredScheduler::new(Rc::new(vts.clone()));
        let ran = Rc::new(RefCell::new(false));
        let ran_clone = Rc::clone(&ran);
        scheduler.schedule_fn(Duration::ZERO, move || *ran_clone.borrow_mut() = true);
        assert!(!*ran.borrow());
        vts.flush().unwrap();
        assert!(*ran.borrow());
    }

    #[test]
    fn cancelling_mid_chain_stops_rescheduling() {
        let vts = VirtualTimeScheduler::new();
        let scheduler = DeferredScheduler::new(Rc::new(vts.clone()));
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let (ticks_clone, clock) = (Rc::clone(&ticks), vts.clone());
        let handle = scheduler.schedule(0_u32, Duration::from_millis(10), move |n| {
            ticks_clone.borrow_mut().push(clock.frame());
            Continuation::Reschedule {
                state: n + 1,
                delay: Duration::from_millis(10),
            }
        });
        vts.advance_to(25).unwrap();
        handle.unsubscribe().unwrap();
        vts.flush().unwrap();
        assert_eq!(*ticks.borrow(), vec![10, 20]);
    }
}
