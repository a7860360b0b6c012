#![forbid(unsafe_code)]

//! Basic observable constructors.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use super::Observable;
use crate::scheduler::{Continuation, Scheduler, SchedulerExt};
use crate::subscription::Teardown;

/// Completes immediately without emitting.
pub fn empty<T: 'static, E: fmt::Debug + 'static>() -> Observable<T, E> {
    Observable::new(|subscriber| {
        subscriber.complete();
        Ok(Teardown::Empty)
    })
}

/// Never emits and never terminates.
pub fn never<T: 'static, E: fmt::Debug + 'static>() -> Observable<T, E> {
    Observable::new(|_| Ok(Teardown::Empty))
}

/// Fails every subscriber with a copy of `err`.
pub fn throw_error<T: 'static, E: Clone + fmt::Debug + 'static>(err: E) -> Observable<T, E> {
    Observable::new(move |_| Err(err.clone()))
}

/// Emits each value synchronously, then completes.
pub fn of<T: Clone + 'static, E: fmt::Debug + 'static>(values: Vec<T>) -> Observable<T, E> {
    from_iter(values)
}

/// Emits each item of a re-iterable source synchronously, then completes.
///
/// Emission stops early if the subscriber is closed mid-iteration.
pub fn from_iter<I, E>(items: I) -> Observable<I::Item, E>
where
    I: IntoIterator + Clone + 'static,
    I::Item: 'static,
    E: fmt::Debug + 'static,
{
    Observable::new(move |subscriber| {
        for item in items.clone() {
            if subscriber.closed() {
                return Ok(Teardown::Empty);
            }
            subscriber.next(item);
        }
        subscriber.complete();
        Ok(Teardown::Empty)
    })
}

/// Emits `0` after `delay` on `scheduler`, then completes.
pub fn timer<E: fmt::Debug + 'static>(
    delay: Duration,
    scheduler: Rc<dyn Scheduler>,
) -> Observable<u64, E> {
    Observable::new(move |subscriber| {
        let target = subscriber.clone();
        let handle = scheduler.schedule_fn(delay, move || {
            target.next(0);
            target.complete();
        });
        Ok(handle.into())
    })
}

/// Emits `0, 1, 2, ...` every `period` on `scheduler`. Never completes.
pub fn interval<E: fmt::Debug + 'static>(
    period: Duration,
    scheduler: Rc<dyn Scheduler>,
) -> Observable<u64, E> {
    Observable::new(move |subscriber| {
        let target = subscriber.clone();
        let handle = scheduler.schedule(0_u64, period, move |tick| {
            target.next(tick);
            Continuation::Reschedule {
                state: tick + 1,
                delay: period,
            }
        });
        Ok(handle.into())
    })
}
