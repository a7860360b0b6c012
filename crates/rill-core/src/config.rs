#![forbid(unsafe_code)]

//! Per-thread runtime configuration.
//!
//! The runtime is single-threaded, so configuration lives in a thread-local
//! slot rather than a process-wide static. [`RxConfig::install`] swaps a new
//! configuration in and returns a [`ConfigGuard`] that restores the previous
//! one when dropped; guards nest.
//!
//! # Hooks
//!
//! | Hook | Fired when | Default |
//! |------|------------|---------|
//! | `on_unhandled_error` | a failure has no caller left to receive it | `tracing::error!` |
//! | `on_stopped_notification` | a notification arrives after a terminal one | `tracing::trace!` |

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::UnhandledError;
use crate::notification::NotificationKind;

type UnhandledHook = Rc<dyn Fn(&UnhandledError)>;
type StoppedHook = Rc<dyn Fn(NotificationKind)>;

thread_local! {
    static ACTIVE: RefCell<Rc<RxConfig>> = RefCell::new(Rc::new(RxConfig::default()));
}

/// Runtime hooks for failures that escape the normal notification path.
#[derive(Clone, Default)]
pub struct RxConfig {
    on_unhandled_error: Option<UnhandledHook>,
    on_stopped_notification: Option<StoppedHook>,
}

impl fmt::Debug for RxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxConfig")
            .field("on_unhandled_error", &self.on_unhandled_error.is_some())
            .field(
                "on_stopped_notification",
                &self.on_stopped_notification.is_some(),
            )
            .finish()
    }
}

impl RxConfig {
    /// Create a configuration with default (logging) hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hook receiving unhandled errors.
    #[must_use]
    pub fn with_unhandled_error_hook(mut self, hook: impl Fn(&UnhandledError) + 'static) -> Self {
        self.on_unhandled_error = Some(Rc::new(hook));
        self
    }

    /// Set the hook receiving notifications that arrive after a terminal one.
    #[must_use]
    pub fn with_stopped_notification_hook(
        mut self,
        hook: impl Fn(NotificationKind) + 'static,
    ) -> Self {
        self.on_stopped_notification = Some(Rc::new(hook));
        self
    }

    /// Make this configuration active on the current thread.
    ///
    /// The previous configuration is restored when the guard drops.
    #[must_use = "dropping the guard immediately restores the previous configuration"]
    pub fn install(self) -> ConfigGuard {
        let previous = ACTIVE.with(|slot| slot.replace(Rc::new(self)));
        ConfigGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// The configuration active on the current thread.
    #[must_use]
    pub fn current() -> Rc<RxConfig> {
        ACTIVE.with(|slot| Rc::clone(&slot.borrow()))
    }
}

/// RAII guard restoring the previously active [`RxConfig`].
pub struct ConfigGuard {
    previous: Option<Rc<RxConfig>>,
    _not_send: PhantomData<Rc<()>>,
}

impl fmt::Debug for ConfigGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigGuard").finish_non_exhaustive()
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            ACTIVE.with(|slot| {
                slot.replace(previous);
            });
        }
    }
}

/// Route a failure with no remaining receiver to the active hook.
pub(crate) fn report_unhandled_error(err: UnhandledError) {
    // Clone the hook out first so the hook may itself install a config.
    let config = RxConfig::current();
    match &config.on_unhandled_error {
        Some(hook) => hook(&err),
        None => tracing::error!(error = %err, "unhandled error in reactive pipeline"),
    }
}

/// Report a notification delivered to an already-stopped subscriber.
pub(crate) fn report_stopped_notification(kind: NotificationKind) {
    let config = RxConfig::current();
    match &config.on_stopped_notification {
        Some(hook) => hook(kind),
        None => tracing::trace!(%kind, "notification dropped: subscriber already stopped"),
    }
}
