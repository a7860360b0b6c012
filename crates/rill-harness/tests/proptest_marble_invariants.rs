//! Property-based invariant tests for the marble grammar and cold replay.
//!
//! 1. Frame arithmetic: a symbol preceded by `k` characters lands at
//!    `k * frame_time_factor`.
//! 2. Groups: every event inside `( )` lands on the frame of the `(`.
//! 3. Subscription offset: frames before `^` are negative, the `^` is zero.
//! 4. Run-mode whitespace: spaces never move an event.
//! 5. Cold replay: subscribing `s` frames late shifts every event by `s`.

use proptest::prelude::*;
use rill_harness::{MarbleParser, TestMessage, TestScheduler, TestSchedulerConfig, deep_equal};

/// Diagram of `a`, `b`, ... each preceded by its gap of dashes, closed by `|`.
fn diagram(gaps: &[usize]) -> String {
    let mut out = String::new();
    for (index, gap) in gaps.iter().enumerate() {
        out.push_str(&"-".repeat(*gap));
        out.push(char::from(b'a' + index as u8));
    }
    out.push('|');
    out
}

fn symbol(index: usize) -> String {
    char::from(b'a' + index as u8).to_string()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Frame arithmetic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn symbols_land_at_their_character_offset(
        gaps in prop::collection::vec(0usize..6, 1..8),
        factor in 1i64..12,
    ) {
        let parser = MarbleParser::new().with_frame_time_factor(factor);
        let messages = parser
            .parse_marbles::<String, String>(&diagram(&gaps), None, None)
            .unwrap();

        let mut offset = 0usize;
        let mut expected = Vec::new();
        for (index, gap) in gaps.iter().enumerate() {
            offset += gap;
            expected.push(TestMessage::next(offset as i64 * factor, symbol(index)));
            offset += 1;
        }
        expected.push(TestMessage::complete(offset as i64 * factor));
        prop_assert_eq!(messages, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Groups
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn grouped_events_share_the_opening_frame(lead in 0usize..10, width in 1usize..6) {
        let inner: String = (0..width).map(symbol).collect();
        let marbles = format!("{}({inner})-x", "-".repeat(lead));
        let messages = MarbleParser::new()
            .parse_marbles::<String, String>(&marbles, None, None)
            .unwrap();

        prop_assert_eq!(messages.len(), width + 1);
        for message in &messages[..width] {
            prop_assert_eq!(message.frame, lead as i64);
        }
        // `(` + symbols + `)` + `-`
        prop_assert_eq!(messages[width].frame, (lead + width + 3) as i64);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Subscription offset
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn caret_is_frame_zero(before in 0usize..8, after in 0usize..8) {
        let marbles = format!("x{}^{}y|", "-".repeat(before), "-".repeat(after));
        let messages = MarbleParser::new()
            .parse_marbles::<String, String>(&marbles, None, None)
            .unwrap();

        prop_assert_eq!(messages[0].frame, -((before + 1) as i64));
        prop_assert_eq!(messages[1].frame, (after + 1) as i64);
        prop_assert_eq!(messages[2].frame, (after + 2) as i64);

        let subscription = MarbleParser::new()
            .parse_subscription_marbles(&format!("{}^{}!", "-".repeat(before), "-".repeat(after)))
            .unwrap();
        prop_assert_eq!(subscription.subscribed, Some(before as i64));
        prop_assert_eq!(subscription.unsubscribed, Some((before + after + 1) as i64));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Run-mode whitespace
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn spaces_are_inert_in_run_mode(
        gaps in prop::collection::vec(0usize..5, 1..6),
        spaces in prop::collection::vec(0usize..3, 8),
    ) {
        let compact = diagram(&gaps);
        let mut padded = String::new();
        for (index, c) in compact.chars().enumerate() {
            padded.push_str(&" ".repeat(spaces[index % spaces.len()]));
            padded.push(c);
        }

        let parser = MarbleParser::new().with_run_mode(true);
        let expected = parser.parse_marbles::<String, String>(&compact, None, None).unwrap();
        let actual = parser.parse_marbles::<String, String>(&padded, None, None).unwrap();
        prop_assert_eq!(actual, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Cold replay
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn late_cold_subscription_shifts_the_diagram(
        gaps in prop::collection::vec(0usize..5, 1..5),
        delay in 0usize..10,
    ) {
        let ts: TestScheduler =
            TestScheduler::with_config(TestSchedulerConfig::default(), deep_equal::<String, String>);
        let source = diagram(&gaps);
        let cold = ts.cold(&source).unwrap();
        let subscription = format!("{}^", "-".repeat(delay));
        let shifted = format!("{}{source}", "-".repeat(delay));

        ts.expect_observable(&cold, Some(&subscription))
            .unwrap()
            .to_be(&shifted)
            .unwrap();
        prop_assert!(ts.flush().is_ok());

        let logs = cold.subscriptions().snapshot();
        prop_assert_eq!(logs.len(), 1);
        prop_assert_eq!(logs[0].subscribed_frame, delay as i64);
        prop_assert_eq!(
            logs[0].unsubscribed_frame,
            Some((delay + source.len() - 1) as i64)
        );
    }
}
