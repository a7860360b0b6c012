#![forbid(unsafe_code)]

//! Timer-backed execution shared by the host-driven policies.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::Work;
use super::host::{TimerHost, TimerId};
use crate::subscription::{Subscription, TeardownKey};

/// Arm a one-shot host timer owned by `handle`.
///
/// Unsubscribing `handle` before the timer fires clears it. Once fired, the
/// clearing finalizer is removed from `handle` again, so repeated arming over
/// a long continuation chain does not accumulate finalizers.
pub(crate) fn set_timer(
    host: &Rc<dyn TimerHost>,
    handle: &Subscription,
    delay: Duration,
    callback: impl FnOnce() + 'static,
) {
    if handle.closed() {
        return;
    }
    let pending: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));
    let key = Rc::new(Cell::new(TeardownKey::None));

    let fired_pending = Rc::clone(&pending);
    let fired_key = Rc::clone(&key);
    let owner = handle.clone();
    let id = host.set_timeout(
        delay,
        Box::new(move || {
            fired_pending.set(None);
            owner.remove(fired_key.get());
            callback();
        }),
    );
    pending.set(Some(id));

    let clear_host = Rc::clone(host);
    key.set(handle.add_fn(move || {
        if let Some(id) = pending.take() {
            clear_host.clear_timeout(id);
        }
    }));
}

/// Run `work` on host timers until it finishes or `handle` is closed.
///
/// Each continuation re-arms a fresh timer with the requested delay. When
/// the work finishes, `handle` is unsubscribed.
pub(crate) fn run_timed(
    host: Rc<dyn TimerHost>,
    handle: Subscription,
    mut work: Work,
    delay: Duration,
) {
    let owner = handle.clone();
    let next_host = Rc::clone(&host);
    set_timer(&host, &handle, delay, move || {
        if owner.closed() {
            return;
        }
        match work() {
            Some(next) => run_timed(next_host, owner, work, next),
            None => owner.unsubscribe_or_report(),
        }
    });
}
