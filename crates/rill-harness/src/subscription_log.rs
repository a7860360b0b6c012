#![forbid(unsafe_code)]

//! Subscribe/unsubscribe frame records for test observables.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rill_core::scheduler::Frame;

/// Frames at which one subscription started and (optionally) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionLog {
    /// Frame of the subscribe call.
    pub subscribed_frame: Frame,
    /// Frame of the unsubscription, `None` while still subscribed.
    pub unsubscribed_frame: Option<Frame>,
}

impl SubscriptionLog {
    /// Open subscription starting at `subscribed_frame`.
    #[must_use]
    pub fn open(subscribed_frame: Frame) -> Self {
        Self {
            subscribed_frame,
            unsubscribed_frame: None,
        }
    }

    /// Closed subscription spanning the two frames.
    #[must_use]
    pub fn closed(subscribed_frame: Frame, unsubscribed_frame: Frame) -> Self {
        Self {
            subscribed_frame,
            unsubscribed_frame: Some(unsubscribed_frame),
        }
    }
}

impl fmt::Display for SubscriptionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unsubscribed_frame {
            Some(end) => write!(f, "^{} !{}", self.subscribed_frame, end),
            None => write!(f, "^{} (open)", self.subscribed_frame),
        }
    }
}

/// Live, shared list of [`SubscriptionLog`]s. Clones see the same list.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionLogs {
    logs: Rc<RefCell<Vec<SubscriptionLog>>>,
}

impl SubscriptionLogs {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SubscriptionLog> {
        self.logs.borrow().clone()
    }

    /// Number of subscriptions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.borrow().len()
    }

    /// Whether nothing subscribed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.borrow().is_empty()
    }

    pub(crate) fn log_subscribed(&self, frame: Frame) -> usize {
        let mut logs = self.logs.borrow_mut();
        logs.push(SubscriptionLog::open(frame));
        logs.len() - 1
    }

    pub(crate) fn log_unsubscribed(&self, index: usize, frame: Frame) {
        if let Some(log) = self.logs.borrow_mut().get_mut(index) {
            log.unsubscribed_frame = Some(frame);
        }
    }
}
