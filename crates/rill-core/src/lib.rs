#![forbid(unsafe_code)]

//! Core: subscriptions, observers, observables, and schedulers.
//!
//! # Role in rill
//! `rill-core` is the push-based runtime. Producers push values into
//! [`Subscriber`]s, operators compose lazily through [`Observable::pipe`], and
//! every piece of acquired work is owned by a node in a [`Subscription`] tree
//! so that a single `unsubscribe` releases it.
//!
//! # Primary responsibilities
//! - **Subscription**: idempotent, tree-shaped teardown with aggregated errors.
//! - **Subscriber**: enforces the `next* (error | complete)?` grammar.
//! - **Observable**: lazy producers, `lift`, and the [`operate`] helper.
//! - **Schedulers**: immediate, queue, deferred, animation-frame, and virtual time.
//!
//! # How it fits in the system
//! `rill-harness` drives [`scheduler::VirtualTimeScheduler`] with marble
//! diagrams and asserts on recorded notifications. Production code picks a
//! host-driven scheduler and feeds it from [`scheduler::RunLoop`] or its own
//! [`scheduler::TimerHost`].
//!
//! # Example
//! ```
//! use rill_core::{Observable, OperatorSubscriber, Subscriber, of, operate};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let doubled = operate(|source: &Observable<i32, String>, dest: &Subscriber<i32, String>| {
//!     source.subscribe_subscriber(
//!         &OperatorSubscriber::new(dest, |v: i32, out| out.next(v * 2)).build(),
//!     );
//!     Ok(())
//! });
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! of::<i32, String>(vec![1, 2, 3])
//!     .pipe(doubled)
//!     .subscribe_next(move |v| sink.borrow_mut().push(v));
//! assert_eq!(*seen.borrow(), vec![2, 4, 6]);
//! ```

pub mod config;
pub mod error;
pub mod notification;
pub mod observable;
pub mod observer;
pub mod scheduler;
pub mod subject;
pub mod subscriber;
pub mod subscription;

pub use config::{ConfigGuard, RxConfig};
pub use error::{BoxError, SchedulerError, TeardownError, UnhandledError, UnsubscriptionError};
pub use notification::{Notification, NotificationKind};
pub use observable::{
    Observable, OperatorSubscriber, empty, from_iter, interval, never, of, operate, throw_error,
    timer,
};
pub use observer::{FnObserver, Observer};
pub use scheduler::{Continuation, Scheduler, SchedulerExt, VirtualTimeScheduler, Work};
pub use subject::Subject;
pub use subscriber::Subscriber;
pub use subscription::{Subscription, SubscriptionGuard, SubscriptionId, Teardown, TeardownKey};
