#![forbid(unsafe_code)]

//! Platform timer and animation-frame primitives.

use std::time::Duration;

/// Identifier of a pending host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Identifier of a pending frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// One-shot timers (`setTimeout` / `clearTimeout` shape).
pub trait TimerHost {
    /// Current host time.
    fn current_time(&self) -> Duration;

    /// Run `callback` once after `delay`.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a pending timer. Unknown or fired ids are ignored.
    fn clear_timeout(&self, id: TimerId);
}

/// Animation-frame callbacks (`requestAnimationFrame` shape).
pub trait FrameHost {
    /// Run `callback` at the next frame with the frame timestamp.
    fn request_frame(&self, callback: Box<dyn FnOnce(Duration)>) -> FrameId;

    /// Cancel a pending frame request. Unknown or fired ids are ignored.
    fn cancel_frame(&self, id: FrameId);
}
