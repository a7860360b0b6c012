#![forbid(unsafe_code)]

//! Virtual-time scheduler with deferred marble assertions.
//!
//! Expectations are registered first and evaluated at [`TestScheduler::flush`]:
//!
//! 1. Hot observables are armed (their messages scheduled).
//! 2. Virtual time is flushed to completion.
//! 3. Every ready expectation is compared with the injected equality
//!    function, in registration order.
//!
//! [`TestScheduler::run`] wraps one such cycle with run-mode parsing and a
//! lifted frame ceiling.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use rill_core::scheduler::{
    Frame, FrameHost, Scheduler, TimerHost, VirtualTimeConfig, VirtualTimeScheduler, Work,
};
use rill_core::{Notification, Observable, Observer, SchedulerError, Subscription};

use crate::cold::ColdObservable;
use crate::config::TestSchedulerConfig;
use crate::hot::HotObservable;
use crate::marble::{MarbleError, MarbleParser, MarbleSymbol, TestMessage};
use crate::report::FlushReport;
use crate::subscription_log::{SubscriptionLog, SubscriptionLogs};

// =============================================================================
// Errors
// =============================================================================

/// A marble expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionError {
    /// One-line description of the mismatch.
    pub summary: String,
    /// Expected entries, one per line.
    pub expected: Vec<String>,
    /// Actual entries, one per line.
    pub actual: Vec<String>,
}

impl AssertionError {
    /// Mismatch described by `summary` over two listings.
    pub fn new(
        summary: impl Into<String>,
        expected: impl IntoIterator<Item = impl fmt::Display>,
        actual: impl IntoIterator<Item = impl fmt::Display>,
    ) -> Self {
        Self {
            summary: summary.into(),
            expected: expected.into_iter().map(|entry| entry.to_string()).collect(),
            actual: actual.into_iter().map(|entry| entry.to_string()).collect(),
        }
    }
}

fn write_listing(f: &mut fmt::Formatter<'_>, label: &str, lines: &[String]) -> fmt::Result {
    write!(f, "\n{label}:")?;
    if lines.is_empty() {
        return f.write_str(" (nothing)");
    }
    for line in lines {
        write!(f, "\n  {line}")?;
    }
    Ok(())
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)?;
        write_listing(f, "expected", &self.expected)?;
        write_listing(f, "actual", &self.actual)
    }
}

impl std::error::Error for AssertionError {}

/// Failure of a harness operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// A diagram could not be parsed.
    Marble(MarbleError),
    /// Virtual time hit its frame ceiling.
    Scheduler(SchedulerError),
    /// An expectation did not hold.
    Assertion(AssertionError),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marble(err) => write!(f, "invalid marble diagram: {err}"),
            Self::Scheduler(err) => write!(f, "{err}"),
            Self::Assertion(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Marble(err) => Some(err),
            Self::Scheduler(err) => Some(err),
            Self::Assertion(err) => Some(err),
        }
    }
}

impl From<MarbleError> for HarnessError {
    fn from(err: MarbleError) -> Self {
        Self::Marble(err)
    }
}

impl From<SchedulerError> for HarnessError {
    fn from(err: SchedulerError) -> Self {
        Self::Scheduler(err)
    }
}

impl From<AssertionError> for HarnessError {
    fn from(err: AssertionError) -> Self {
        Self::Assertion(err)
    }
}

// =============================================================================
// Equality
// =============================================================================

/// What an equality function is asked to compare.
#[derive(Debug)]
pub enum Comparison<'a, T, E> {
    /// Recorded notifications against expected ones.
    Messages {
        /// Recorded during the flush.
        actual: &'a [TestMessage<T, E>],
        /// Parsed from the expected diagram, or recorded from another observable.
        expected: &'a [TestMessage<T, E>],
    },
    /// Subscription spans against expected ones.
    Subscriptions {
        /// Read from the subscription log at flush time.
        actual: &'a [SubscriptionLog],
        /// Parsed from the expected diagrams.
        expected: &'a [SubscriptionLog],
    },
}

/// Injected equality function.
pub type AssertFn<T, E> = Rc<dyn Fn(Comparison<'_, T, E>) -> Result<(), AssertionError>>;

fn first_difference<A: PartialEq>(actual: &[A], expected: &[A]) -> Option<usize> {
    let shared = actual.len().min(expected.len());
    (0..shared)
        .find(|&index| actual[index] != expected[index])
        .or_else(|| (actual.len() != expected.len()).then_some(shared))
}

/// Frame-exact, order-sensitive structural comparison.
pub fn deep_equal<T, E>(comparison: Comparison<'_, T, E>) -> Result<(), AssertionError>
where
    T: PartialEq + fmt::Debug,
    E: PartialEq + fmt::Debug,
{
    match comparison {
        Comparison::Messages { actual, expected } => match first_difference(actual, expected) {
            None => Ok(()),
            Some(index) => Err(AssertionError::new(
                format!("notifications differ at entry {index}"),
                expected,
                actual,
            )),
        },
        Comparison::Subscriptions { actual, expected } => {
            match first_difference(actual, expected) {
                None => Ok(()),
                Some(index) => Err(AssertionError::new(
                    format!("subscriptions differ at entry {index}"),
                    expected,
                    actual,
                )),
            }
        }
    }
}

// =============================================================================
// Deferred expectations
// =============================================================================

type MessageLog<T, E> = Rc<RefCell<Vec<TestMessage<T, E>>>>;

struct ObservableTest<T, E> {
    ready: Cell<bool>,
    actual: MessageLog<T, E>,
    expected: RefCell<MessageLog<T, E>>,
}

struct SubscriptionsTest {
    ready: Cell<bool>,
    logs: SubscriptionLogs,
    expected: RefCell<Vec<SubscriptionLog>>,
}

enum FlushTest<T, E> {
    Observable(Rc<ObservableTest<T, E>>),
    Subscriptions(Rc<SubscriptionsTest>),
}

impl<T, E> FlushTest<T, E> {
    fn is_ready(&self) -> bool {
        match self {
            Self::Observable(test) => test.ready.get(),
            Self::Subscriptions(test) => test.ready.get(),
        }
    }
}

/// Records notifications with frames relative to `origin`, dropping any
/// at or after `cutoff`.
struct Recorder<T, E> {
    clock: VirtualTimeScheduler,
    origin: Frame,
    cutoff: Option<Frame>,
    log: MessageLog<T, E>,
}

impl<T, E> Recorder<T, E> {
    fn push(&self, notification: Notification<T, E>) {
        let frame = self.clock.frame();
        if self.cutoff.is_some_and(|end| frame >= end) {
            return;
        }
        self.log
            .borrow_mut()
            .push(TestMessage::new(frame - self.origin, notification));
    }
}

impl<T, E> Observer<T, E> for Recorder<T, E> {
    fn next(&self, value: T) {
        self.push(Notification::Next(value));
    }

    fn error(&self, err: E) {
        self.push(Notification::Error(err));
    }

    fn complete(&self) {
        self.push(Notification::Complete);
    }
}

/// Subscribe/unsubscribe window of one expectation, in absolute frames.
#[derive(Debug, Clone, Copy)]
struct Window {
    origin: Frame,
    subscribe_at: Frame,
    unsubscribe_at: Option<Frame>,
}

impl Window {
    /// Schedule a subscription of `observable` into `log` over this window.
    fn record<T, E>(
        &self,
        clock: &VirtualTimeScheduler,
        observable: Observable<T, E>,
        log: MessageLog<T, E>,
    ) where
        T: 'static,
        E: fmt::Debug + 'static,
    {
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let recorder = Recorder {
            clock: clock.clone(),
            origin: self.origin,
            cutoff: self.unsubscribe_at,
            log,
        };
        let subscribe_slot = Rc::clone(&slot);
        clock.schedule_once_at(self.subscribe_at, move || {
            let subscription = observable.subscribe(recorder);
            *subscribe_slot.borrow_mut() = Some(subscription);
        });
        if let Some(end) = self.unsubscribe_at {
            clock.schedule_once_at(end, move || {
                let taken = slot.borrow_mut().take();
                if let Some(subscription) = taken {
                    subscription.unsubscribe_or_report();
                }
            });
        }
    }
}

/// Pending notification expectation returned by
/// [`TestScheduler::expect_observable`].
#[must_use = "an expectation does nothing until to_be or to_equal is called"]
pub struct ExpectObservable<T, E> {
    test: Rc<ObservableTest<T, E>>,
    parser: MarbleParser,
    clock: VirtualTimeScheduler,
    window: Window,
}

impl<T, E> ExpectObservable<T, E>
where
    T: Clone + MarbleSymbol + 'static,
    E: Clone + MarbleSymbol + fmt::Debug + 'static,
{
    /// Expect the notifications drawn in `marbles`.
    pub fn to_be(self, marbles: &str) -> Result<(), MarbleError> {
        self.set_expected(marbles, None, None)
    }

    /// Expect `marbles`, mapping symbols through `values` and `#` to `error`.
    pub fn to_be_with(
        self,
        marbles: &str,
        values: &HashMap<char, T>,
        error: Option<E>,
    ) -> Result<(), MarbleError> {
        self.set_expected(marbles, Some(values), error.as_ref())
    }

    fn set_expected(
        self,
        marbles: &str,
        values: Option<&HashMap<char, T>>,
        error: Option<&E>,
    ) -> Result<(), MarbleError> {
        let expected = self.parser.parse_marbles(marbles, values, error)?;
        *self.test.expected.borrow_mut() = Rc::new(RefCell::new(expected));
        self.test.ready.set(true);
        Ok(())
    }
}

impl<T, E> ExpectObservable<T, E>
where
    T: 'static,
    E: fmt::Debug + 'static,
{
    /// Expect the same notifications as `other`, subscribed at the same
    /// frame. `other` is recorded in full: the `!` cutoff only applies to the
    /// observable under test.
    pub fn to_equal(self, other: impl AsRef<Observable<T, E>>) {
        let log: MessageLog<T, E> = Rc::new(RefCell::new(Vec::new()));
        let window = Window {
            unsubscribe_at: None,
            ..self.window
        };
        window.record(&self.clock, other.as_ref().clone(), Rc::clone(&log));
        *self.test.expected.borrow_mut() = log;
        self.test.ready.set(true);
    }
}

/// Pending subscription expectation returned by
/// [`TestScheduler::expect_subscriptions`].
#[must_use = "an expectation does nothing until to_be or to_be_all is called"]
pub struct ExpectSubscriptions {
    test: Rc<SubscriptionsTest>,
    parser: MarbleParser,
}

impl ExpectSubscriptions {
    /// Expect exactly one subscription drawn in `marbles`.
    pub fn to_be(self, marbles: &str) -> Result<(), MarbleError> {
        self.to_be_all(&[marbles])
    }

    /// Expect one subscription per diagram, in subscribe order. Diagrams
    /// without a `^` contribute nothing.
    pub fn to_be_all(self, marbles: &[&str]) -> Result<(), MarbleError> {
        let mut expected = Vec::with_capacity(marbles.len());
        for diagram in marbles {
            let parsed = self.parser.parse_subscription_marbles(diagram)?;
            if let Some(subscribed_frame) = parsed.subscribed {
                expected.push(SubscriptionLog {
                    subscribed_frame,
                    unsubscribed_frame: parsed.unsubscribed,
                });
            }
        }
        *self.test.expected.borrow_mut() = expected;
        self.test.ready.set(true);
        Ok(())
    }
}

// =============================================================================
// TestScheduler
// =============================================================================

struct TestInner<T, E> {
    vts: VirtualTimeScheduler,
    config: TestSchedulerConfig,
    run_mode: Cell<bool>,
    assert: AssertFn<T, E>,
    hot_setups: RefCell<Vec<Box<dyn FnOnce()>>>,
    tests: RefCell<Vec<FlushTest<T, E>>>,
    last_report: RefCell<Option<FlushReport>>,
}

/// Marble-testing scheduler over a [`VirtualTimeScheduler`].
///
/// Cloning shares the clock, the pending expectations, and the hot
/// observables awaiting setup.
///
/// # Example
///
/// ```
/// use rill_harness::TestScheduler;
///
/// let scheduler: TestScheduler = TestScheduler::with_default_assert();
/// scheduler
///     .run(|helpers| {
///         let source = helpers.cold("-a-b|")?;
///         helpers.expect_observable(&source, None)?.to_be("-a-b|")?;
///         Ok(())
///     })
///     .unwrap();
/// ```
pub struct TestScheduler<T = String, E = String> {
    inner: Rc<TestInner<T, E>>,
}

impl<T, E> Clone for TestScheduler<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for TestScheduler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScheduler")
            .field("frame", &self.inner.vts.frame())
            .field("run_mode", &self.inner.run_mode.get())
            .field("pending_tests", &self.inner.tests.borrow().len())
            .field("pending_hot", &self.inner.hot_setups.borrow().len())
            .finish()
    }
}

impl<T: PartialEq + fmt::Debug + 'static, E: PartialEq + fmt::Debug + 'static> TestScheduler<T, E> {
    /// Scheduler comparing with [`deep_equal`], configured from the
    /// environment.
    #[must_use]
    pub fn with_default_assert() -> Self {
        Self::new(deep_equal::<T, E>)
    }
}

impl<T: 'static, E: 'static> TestScheduler<T, E> {
    /// Scheduler using `assert` for every comparison, configured from the
    /// environment.
    pub fn new(
        assert: impl Fn(Comparison<'_, T, E>) -> Result<(), AssertionError> + 'static,
    ) -> Self {
        Self::with_config(TestSchedulerConfig::from_env(), assert)
    }

    /// Scheduler with explicit configuration.
    pub fn with_config(
        config: TestSchedulerConfig,
        assert: impl Fn(Comparison<'_, T, E>) -> Result<(), AssertionError> + 'static,
    ) -> Self {
        let vts = VirtualTimeScheduler::with_config(
            VirtualTimeConfig::default().with_max_frames(config.max_frames),
        );
        Self {
            inner: Rc::new(TestInner {
                vts,
                config,
                run_mode: Cell::new(false),
                assert: Rc::new(assert),
                hot_setups: RefCell::new(Vec::new()),
                tests: RefCell::new(Vec::new()),
                last_report: RefCell::new(None),
            }),
        }
    }
}

impl<T, E> TestScheduler<T, E> {
    /// The underlying virtual clock.
    #[must_use]
    pub fn virtual_time(&self) -> &VirtualTimeScheduler {
        &self.inner.vts
    }

    /// Current virtual frame.
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.inner.vts.frame()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TestSchedulerConfig {
        &self.inner.config
    }

    /// Whether a [`run`](Self::run) callback is executing.
    #[must_use]
    pub fn is_run_mode(&self) -> bool {
        self.inner.run_mode.get()
    }

    /// Registered expectations not yet evaluated.
    #[must_use]
    pub fn pending_expectations(&self) -> usize {
        self.inner.tests.borrow().len()
    }

    /// Report of the most recent [`flush`](Self::flush).
    #[must_use]
    pub fn last_report(&self) -> Option<FlushReport> {
        self.inner.last_report.borrow().clone()
    }

    /// Parser for the current mode. Run mode always uses a factor of 1.
    #[must_use]
    pub fn parser(&self) -> MarbleParser {
        if self.inner.run_mode.get() {
            MarbleParser::new().with_run_mode(true)
        } else {
            MarbleParser::new().with_frame_time_factor(self.inner.config.frame_time_factor)
        }
    }

    /// Frames until the `|` in `marbles`.
    pub fn time(&self, marbles: &str) -> Result<Frame, MarbleError> {
        self.parser().parse_time(marbles)
    }

    /// Expect the subscription spans recorded in `logs`.
    pub fn expect_subscriptions(&self, logs: SubscriptionLogs) -> ExpectSubscriptions {
        let test = Rc::new(SubscriptionsTest {
            ready: Cell::new(false),
            logs,
            expected: RefCell::new(Vec::new()),
        });
        self.inner
            .tests
            .borrow_mut()
            .push(FlushTest::Subscriptions(Rc::clone(&test)));
        ExpectSubscriptions {
            test,
            parser: self.parser(),
        }
    }
}

impl<T, E> TestScheduler<T, E>
where
    T: Clone + MarbleSymbol + 'static,
    E: Clone + MarbleSymbol + fmt::Debug + 'static,
{
    /// Cold observable drawn in `marbles`.
    pub fn cold(&self, marbles: &str) -> Result<ColdObservable<T, E>, MarbleError> {
        self.cold_with(marbles, None, None)
    }

    /// Cold observable with explicit symbol values and error.
    pub fn cold_with(
        &self,
        marbles: &str,
        values: Option<&HashMap<char, T>>,
        error: Option<E>,
    ) -> Result<ColdObservable<T, E>, MarbleError> {
        if marbles.contains('^') {
            return Err(MarbleError::SubscriptionInCold);
        }
        let messages = self.parser().parse_marbles(marbles, values, error.as_ref())?;
        Ok(ColdObservable::new(messages, self.inner.vts.clone()))
    }

    /// Hot observable drawn in `marbles`. Armed at the next flush.
    pub fn hot(&self, marbles: &str) -> Result<HotObservable<T, E>, MarbleError> {
        self.hot_with(marbles, None, None)
    }

    /// Hot observable with explicit symbol values and error.
    pub fn hot_with(
        &self,
        marbles: &str,
        values: Option<&HashMap<char, T>>,
        error: Option<E>,
    ) -> Result<HotObservable<T, E>, MarbleError> {
        let messages = self.parser().parse_marbles(marbles, values, error.as_ref())?;
        let hot = HotObservable::new(messages, self.inner.vts.clone());
        let armed = hot.clone();
        self.inner
            .hot_setups
            .borrow_mut()
            .push(Box::new(move || armed.setup()));
        Ok(hot)
    }
}

impl<T, E> TestScheduler<T, E>
where
    T: 'static,
    E: fmt::Debug + 'static,
{
    /// Subscribe to `observable` at flush time and record what it emits.
    ///
    /// `subscription_marbles` such as `"^---!"` shift the subscription and
    /// force an unsubscription; notifications at or after the `!` frame are
    /// not recorded.
    pub fn expect_observable(
        &self,
        observable: impl AsRef<Observable<T, E>>,
        subscription_marbles: Option<&str>,
    ) -> Result<ExpectObservable<T, E>, MarbleError> {
        let parser = self.parser();
        let parsed = match subscription_marbles {
            Some(marbles) => parser.parse_subscription_marbles(marbles)?,
            None => Default::default(),
        };
        let origin = self.inner.vts.frame();
        let window = Window {
            origin,
            subscribe_at: origin.saturating_add(parsed.subscribed.unwrap_or(0)),
            unsubscribe_at: parsed.unsubscribed.map(|frame| origin.saturating_add(frame)),
        };
        let actual: MessageLog<T, E> = Rc::new(RefCell::new(Vec::new()));
        window.record(&self.inner.vts, observable.as_ref().clone(), Rc::clone(&actual));

        let test = Rc::new(ObservableTest {
            ready: Cell::new(false),
            actual,
            expected: RefCell::new(Rc::new(RefCell::new(Vec::new()))),
        });
        self.inner
            .tests
            .borrow_mut()
            .push(FlushTest::Observable(Rc::clone(&test)));
        Ok(ExpectObservable {
            test,
            parser,
            clock: self.inner.vts.clone(),
            window,
        })
    }
}

impl<T: fmt::Debug, E: fmt::Debug> TestScheduler<T, E> {
    fn take_ready_tests(&self) -> Vec<FlushTest<T, E>> {
        let mut tests = self.inner.tests.borrow_mut();
        let (ready, pending): (Vec<_>, Vec<_>) =
            tests.drain(..).partition(FlushTest::is_ready);
        *tests = pending;
        ready
    }

    fn evaluate(
        &self,
        test: &FlushTest<T, E>,
        report: &mut FlushReport,
    ) -> Result<(), AssertionError> {
        match test {
            FlushTest::Observable(test) => {
                let actual = test.actual.borrow();
                let expected_log = Rc::clone(&*test.expected.borrow());
                let expected = expected_log.borrow();
                let outcome = (self.inner.assert)(Comparison::Messages {
                    actual: &actual,
                    expected: &expected,
                });
                report.record_observable(&actual, &expected, outcome.is_ok());
                outcome
            }
            FlushTest::Subscriptions(test) => {
                let actual = test.logs.snapshot();
                let expected = test.expected.borrow();
                let outcome = (self.inner.assert)(Comparison::Subscriptions {
                    actual: &actual,
                    expected: &expected,
                });
                report.record_subscriptions(&actual, &expected, outcome.is_ok());
                outcome
            }
        }
    }

    /// Arm hot observables, run virtual time to completion, and evaluate
    /// every ready expectation.
    ///
    /// Returns the first failed expectation; later failures are logged.
    /// Expectations without `to_be`/`to_equal` stay pending.
    pub fn flush(&self) -> Result<(), HarnessError> {
        let hot_setups = std::mem::take(&mut *self.inner.hot_setups.borrow_mut());
        for setup in hot_setups {
            setup();
        }
        self.inner.vts.flush()?;

        let ready = self.take_ready_tests();
        let mut report = FlushReport::new();
        let mut first_failure = None;
        let mut failures = 0_usize;
        for test in &ready {
            if let Err(err) = self.evaluate(test, &mut report) {
                failures += 1;
                if first_failure.is_none() {
                    first_failure = Some(err);
                } else {
                    tracing::warn!(%err, "additional marble assertion failure");
                }
            }
        }
        report.record_summary(self.inner.vts.frame(), failures);
        tracing::debug!(
            checked = ready.len(),
            failures,
            frame = self.inner.vts.frame(),
            "test scheduler flushed"
        );

        if let Some(path) = &self.inner.config.report_path
            && let Err(err) = report.append_to(path)
        {
            tracing::warn!(%err, path = %path.display(), "failed to write flush report");
        }
        *self.inner.last_report.borrow_mut() = Some(report);

        match first_failure {
            Some(err) => Err(HarnessError::Assertion(err)),
            None => Ok(()),
        }
    }

    /// Run `callback` in run mode, then flush.
    ///
    /// Inside the callback, diagrams ignore whitespace and accept time
    /// progressions, one character is one frame, and the frame ceiling is
    /// lifted to `run_max_frames`. Both are restored afterwards, even if
    /// the callback panics.
    pub fn run<R>(
        &self,
        callback: impl FnOnce(&RunHelpers<'_, T, E>) -> Result<R, HarnessError>,
    ) -> Result<R, HarnessError> {
        let restore = RunModeGuard {
            run_mode: &self.inner.run_mode,
            vts: &self.inner.vts,
            previous_max: self.inner.vts.set_max_frames(self.inner.config.run_max_frames),
            previous_mode: self.inner.run_mode.replace(true),
        };
        let helpers = RunHelpers { scheduler: self };
        let value = callback(&helpers)?;
        self.flush()?;
        drop(restore);

        let unready = std::mem::take(&mut *self.inner.tests.borrow_mut());
        if !unready.is_empty() {
            tracing::warn!(
                count = unready.len(),
                "expectations registered without to_be/to_equal were never checked"
            );
        }
        Ok(value)
    }
}

impl<T, E> Scheduler for TestScheduler<T, E> {
    fn now(&self) -> Duration {
        self.inner.vts.now()
    }

    fn schedule_work(&self, work: Work, delay: Duration) -> Subscription {
        self.inner.vts.schedule_work(work, delay)
    }
}

struct RunModeGuard<'a> {
    run_mode: &'a Cell<bool>,
    vts: &'a VirtualTimeScheduler,
    previous_max: Frame,
    previous_mode: bool,
}

impl Drop for RunModeGuard<'_> {
    fn drop(&mut self) {
        self.run_mode.set(self.previous_mode);
        self.vts.set_max_frames(self.previous_max);
    }
}

// =============================================================================
// Run helpers
// =============================================================================

/// Helpers handed to a [`TestScheduler::run`] callback.
pub struct RunHelpers<'a, T, E> {
    scheduler: &'a TestScheduler<T, E>,
}

impl<T, E> RunHelpers<'_, T, E>
where
    T: Clone + MarbleSymbol + 'static,
    E: Clone + MarbleSymbol + fmt::Debug + 'static,
{
    /// See [`TestScheduler::cold`].
    pub fn cold(&self, marbles: &str) -> Result<ColdObservable<T, E>, MarbleError> {
        self.scheduler.cold(marbles)
    }

    /// See [`TestScheduler::cold_with`].
    pub fn cold_with(
        &self,
        marbles: &str,
        values: &HashMap<char, T>,
        error: Option<E>,
    ) -> Result<ColdObservable<T, E>, MarbleError> {
        self.scheduler.cold_with(marbles, Some(values), error)
    }

    /// See [`TestScheduler::hot`].
    pub fn hot(&self, marbles: &str) -> Result<HotObservable<T, E>, MarbleError> {
        self.scheduler.hot(marbles)
    }

    /// See [`TestScheduler::hot_with`].
    pub fn hot_with(
        &self,
        marbles: &str,
        values: &HashMap<char, T>,
        error: Option<E>,
    ) -> Result<HotObservable<T, E>, MarbleError> {
        self.scheduler.hot_with(marbles, Some(values), error)
    }
}

impl<T, E> RunHelpers<'_, T, E>
where
    T: 'static,
    E: fmt::Debug + 'static,
{
    /// See [`TestScheduler::expect_observable`].
    pub fn expect_observable(
        &self,
        observable: impl AsRef<Observable<T, E>>,
        subscription_marbles: Option<&str>,
    ) -> Result<ExpectObservable<T, E>, MarbleError> {
        self.scheduler.expect_observable(observable, subscription_marbles)
    }

    /// Virtual clock as a timer host, for deferred and queue schedulers.
    #[must_use]
    pub fn timer_host(&self) -> Rc<dyn TimerHost> {
        Rc::new(self.scheduler.inner.vts.clone())
    }

    /// Virtual clock as a frame host, for animation-frame schedulers.
    #[must_use]
    pub fn frame_host(&self) -> Rc<dyn FrameHost> {
        Rc::new(self.scheduler.inner.vts.clone())
    }

    /// The test scheduler itself as a [`Scheduler`].
    #[must_use]
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::new(self.scheduler.clone())
    }
}

impl<T, E> RunHelpers<'_, T, E> {
    /// See [`TestScheduler::time`].
    pub fn time(&self, marbles: &str) -> Result<Frame, MarbleError> {
        self.scheduler.time(marbles)
    }

    /// See [`TestScheduler::expect_subscriptions`].
    pub fn expect_subscriptions(&self, logs: SubscriptionLogs) -> ExpectSubscriptions {
        self.scheduler.expect_subscriptions(logs)
    }

    /// Current virtual frame.
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.scheduler.frame()
    }
}

impl<T: fmt::Debug, E: fmt::Debug> RunHelpers<'_, T, E> {
    /// Flush early, inside the callback. See [`TestScheduler::flush`].
    pub fn flush(&self) -> Result<(), HarnessError> {
        self.scheduler.flush()
    }
}
