#![forbid(unsafe_code)]

//! Marble testing for rill.
//!
//! # Role in rill
//! `rill-harness` turns ASCII timelines into deterministic tests. Diagrams
//! become [`ColdObservable`]s and [`HotObservable`]s on a shared virtual
//! clock; expectations are registered up front and checked when
//! [`TestScheduler::flush`] runs the clock to completion.
//!
//! # Primary responsibilities
//! - **Marble grammar**: [`MarbleParser`] for notification, subscription, and
//!   time diagrams, including run-mode time progressions.
//! - **Test doubles**: cold replay per subscriber, hot broadcast on one
//!   timeline, both logging subscription spans.
//! - **Assertions**: `expect_observable(..).to_be(..)` and
//!   `expect_subscriptions(..).to_be(..)` with an injectable equality function.
//! - **Reports**: [`FlushReport`] as JSONL for CI diffing.
//!
//! # Example
//! ```
//! use rill_harness::TestScheduler;
//!
//! let scheduler: TestScheduler = TestScheduler::with_default_assert();
//! let result = scheduler.run(|helpers| {
//!     let source = helpers.hot("--a--^--b--c--|")?;
//!     helpers
//!         .expect_observable(&source, Some("^----!"))?
//!         .to_be("---b-")?;
//!     helpers.expect_subscriptions(source.subscriptions()).to_be("^----!")?;
//!     Ok(())
//! });
//! assert!(result.is_ok(), "{}", result.unwrap_err());
//! ```

pub mod cold;
pub mod config;
pub mod hot;
pub mod marble;
pub mod report;
pub mod subscription_log;
pub mod test_scheduler;

pub use cold::ColdObservable;
pub use config::{ConfigError, ConfigParse, TestSchedulerConfig};
pub use hot::HotObservable;
pub use marble::{MarbleError, MarbleParser, MarbleSymbol, SubscriptionMarbles, TestMessage};
pub use report::FlushReport;
pub use subscription_log::{SubscriptionLog, SubscriptionLogs};
pub use test_scheduler::{
    AssertFn, AssertionError, Comparison, ExpectObservable, ExpectSubscriptions, HarnessError,
    RunHelpers, TestScheduler, deep_equal,
};
