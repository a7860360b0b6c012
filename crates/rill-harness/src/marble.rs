#![forbid(unsafe_code)]

//! Marble diagram parsing.
//!
//! A marble diagram is a string where each character is one frame of
//! virtual time (multiplied by the frame time factor):
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `-` | one frame, no event |
//! | `a`-`z`, `0`-`9`, ... | `next` with the mapped value, or the symbol itself |
//! | `\|` | `complete` |
//! | `#` | `error` |
//! | `(ab\|)` | group: every event inside lands on the frame of the `(` |
//! | `^` | subscription point; frames before it are negative |
//! | `!` | unsubscription point (subscription diagrams only) |
//! | ` ` | one frame, or nothing in run mode |
//!
//! In run mode, a time progression such as `10ms `, `1.5s ` or `2m ` (note
//! the trailing space) at the start of the diagram or after a space
//! advances the clock by that many milliseconds.
//!
//! Grouped tokens still occupy their own frames: `(ab)` is four frames wide.

use std::collections::HashMap;
use std::fmt;

use rill_core::Notification;
use rill_core::scheduler::Frame;

/// A notification at a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage<T, E> {
    /// Frame the notification occurs at.
    pub frame: Frame,
    /// The notification.
    pub notification: Notification<T, E>,
}

impl<T, E> TestMessage<T, E> {
    /// Message at `frame`.
    pub fn new(frame: Frame, notification: Notification<T, E>) -> Self {
        Self {
            frame,
            notification,
        }
    }

    /// `next(value)` at `frame`.
    pub fn next(frame: Frame, value: T) -> Self {
        Self::new(frame, Notification::Next(value))
    }

    /// `error(err)` at `frame`.
    pub fn error(frame: Frame, err: E) -> Self {
        Self::new(frame, Notification::Error(err))
    }

    /// `complete` at `frame`.
    pub fn complete(frame: Frame) -> Self {
        Self::new(frame, Notification::Complete)
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Display for TestMessage<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}: {}", self.frame, self.notification)
    }
}

/// Subscribe/unsubscribe frames parsed from a subscription diagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionMarbles {
    /// Frame of `^`, if present.
    pub subscribed: Option<Frame>,
    /// Frame of `!`, if present.
    pub unsubscribed: Option<Frame>,
}

/// Malformed marble diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarbleError {
    /// `!` inside a diagram describing notifications.
    UnsubscriptionInObservable,
    /// `^` inside a cold observable diagram.
    SubscriptionInCold,
    /// More than one `^` in a subscription diagram.
    DuplicateSubscriptionPoint,
    /// More than one `!` in a subscription diagram.
    DuplicateUnsubscriptionPoint,
    /// A character other than `-`, `(`, `)`, `^`, `!` or a space in a
    /// subscription diagram.
    IllegalSubscriptionChar {
        /// The offending character.
        symbol: char,
        /// Character index in the diagram.
        index: usize,
    },
    /// A symbol with no mapped value and no default.
    MissingValue(char),
    /// `#` with no error value and no default.
    MissingErrorValue,
    /// A time diagram without a `|`.
    MissingCompletion,
    /// The diagram, usually through a time progression, runs past the last
    /// representable frame.
    FrameOverflow,
}

impl fmt::Display for MarbleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsubscriptionInObservable => {
                f.write_str("observable diagrams cannot have an unsubscription marker '!'")
            }
            Self::SubscriptionInCold => {
                f.write_str("cold observable diagrams cannot have a subscription offset '^'")
            }
            Self::DuplicateSubscriptionPoint => f.write_str(
                "found a second subscription point '^' in a subscription diagram; there can only be one",
            ),
            Self::DuplicateUnsubscriptionPoint => f.write_str(
                "found a second unsubscription point '!' in a subscription diagram; there can only be one",
            ),
            Self::IllegalSubscriptionChar { symbol, index } => write!(
                f,
                "subscription diagrams can only contain '^' and '!' markers; found {symbol:?} at {index}"
            ),
            Self::MissingValue(symbol) => write!(f, "no value for marble symbol {symbol:?}"),
            Self::MissingErrorValue => f.write_str("'#' used without an error value"),
            Self::MissingCompletion => {
                f.write_str("time diagrams must have a completion marker '|'")
            }
            Self::FrameOverflow => {
                f.write_str("marble diagram runs past the last representable frame")
            }
        }
    }
}

impl std::error::Error for MarbleError {}

/// Value a marble symbol stands for when no value map covers it.
pub trait MarbleSymbol: Sized {
    /// Value for `symbol`, if one exists.
    fn from_symbol(symbol: char) -> Option<Self>;

    /// Value `#` stands for when no error value is given.
    fn default_error() -> Option<Self> {
        None
    }
}

impl MarbleSymbol for String {
    fn from_symbol(symbol: char) -> Option<Self> {
        Some(symbol.to_string())
    }

    fn default_error() -> Option<Self> {
        Some("error".to_string())
    }
}

impl MarbleSymbol for char {
    fn from_symbol(symbol: char) -> Option<Self> {
        Some(symbol)
    }
}

impl MarbleSymbol for &'static str {
    fn from_symbol(_symbol: char) -> Option<Self> {
        None
    }

    fn default_error() -> Option<Self> {
        Some("error")
    }
}

macro_rules! digit_symbols {
    ($($ty:ty),*) => {
        $(impl MarbleSymbol for $ty {
            fn from_symbol(symbol: char) -> Option<Self> {
                symbol.to_digit(10).and_then(|d| <$ty>::try_from(d).ok())
            }
        })*
    };
}

digit_symbols!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Marble diagram parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarbleParser {
    /// Frames per diagram character.
    pub frame_time_factor: Frame,
    /// Ignore spaces and accept time progressions.
    pub run_mode: bool,
}

impl Default for MarbleParser {
    fn default() -> Self {
        Self {
            frame_time_factor: 1,
            run_mode: false,
        }
    }
}

impl MarbleParser {
    /// Parser with factor 1 outside run mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frame time factor.
    #[must_use]
    pub fn with_frame_time_factor(mut self, factor: Frame) -> Self {
        self.frame_time_factor = factor.max(1);
        self
    }

    /// Enable or disable run mode.
    #[must_use]
    pub fn with_run_mode(mut self, run_mode: bool) -> Self {
        self.run_mode = run_mode;
        self
    }

    fn advance(&self, count: Frame) -> Frame {
        count.saturating_mul(self.frame_time_factor)
    }

    /// Parse a notification diagram.
    ///
    /// Symbols map through `values` first, then [`MarbleSymbol::from_symbol`].
    /// `#` uses `error`, then [`MarbleSymbol::default_error`].
    pub fn parse_marbles<T, E>(
        &self,
        marbles: &str,
        values: Option<&HashMap<char, T>>,
        error: Option<&E>,
    ) -> Result<Vec<TestMessage<T, E>>, MarbleError>
    where
        T: Clone + MarbleSymbol,
        E: Clone + MarbleSymbol,
    {
        if marbles.contains('!') {
            return Err(MarbleError::UnsubscriptionInObservable);
        }
        let chars: Vec<char> = marbles.chars().collect();
        let sub_index = if self.run_mode {
            marbles.trim().chars().position(|c| c == '^')
        } else {
            chars.iter().position(|&c| c == '^')
        };
        let mut frame: Frame = sub_index.map_or(0, |index| -self.advance(index as Frame));
        let mut group_start: Option<Frame> = None;
        let mut messages = Vec::new();

        let mut i = 0;
        while i < chars.len() {
            let mut next_frame = frame;
            let mut notification = None;
            match chars[i] {
                ' ' => {
                    if !self.run_mode {
                        next_frame = step(next_frame, self.advance(1))?;
                    }
                }
                '-' | '^' => next_frame = step(next_frame, self.advance(1))?,
                '(' => {
                    group_start = Some(frame);
                    next_frame = step(next_frame, self.advance(1))?;
                }
                ')' => {
                    group_start = None;
                    next_frame = step(next_frame, self.advance(1))?;
                }
                '|' => {
                    notification = Some(Notification::Complete);
                    next_frame = step(next_frame, self.advance(1))?;
                }
                '#' => {
                    let err = error
                        .cloned()
                        .or_else(E::default_error)
                        .ok_or(MarbleError::MissingErrorValue)?;
                    notification = Some(Notification::Error(err));
                    next_frame = step(next_frame, self.advance(1))?;
                }
                symbol => match self.time_progression(&chars, i) {
                    Some((consumed, ms)) => {
                        i += consumed - 1;
                        next_frame = step(next_frame, ms)?;
                    }
                    None => {
                        let value = values
                            .and_then(|map| map.get(&symbol).cloned())
                            .or_else(|| T::from_symbol(symbol))
                            .ok_or(MarbleError::MissingValue(symbol))?;
                        notification = Some(Notification::Next(value));
                        next_frame = step(next_frame, self.advance(1))?;
                    }
                },
            }
            if let Some(notification) = notification {
                messages.push(TestMessage::new(group_start.unwrap_or(frame), notification));
            }
            frame = next_frame;
            i += 1;
        }
        Ok(messages)
    }

    /// Parse a subscription diagram such as `"--^---!"`.
    pub fn parse_subscription_marbles(
        &self,
        marbles: &str,
    ) -> Result<SubscriptionMarbles, MarbleError> {
        let chars: Vec<char> = marbles.chars().collect();
        let mut frame: Frame = 0;
        let mut group_start: Option<Frame> = None;
        let mut parsed = SubscriptionMarbles::default();

        let mut i = 0;
        while i < chars.len() {
            let mut next_frame = frame;
            match chars[i] {
                ' ' => {
                    if !self.run_mode {
                        next_frame = step(next_frame, self.advance(1))?;
                    }
                }
                '-' => next_frame = step(next_frame, self.advance(1))?,
                '(' => {
                    group_start = Some(frame);
                    next_frame = step(next_frame, self.advance(1))?;
                }
                ')' => {
                    group_start = None;
                    next_frame = step(next_frame, self.advance(1))?;
                }
                '^' => {
                    if parsed.subscribed.is_some() {
                        return Err(MarbleError::DuplicateSubscriptionPoint);
                    }
                    parsed.subscribed = Some(group_start.unwrap_or(frame));
                    next_frame = step(next_frame, self.advance(1))?;
                }
                '!' => {
                    if parsed.unsubscribed.is_some() {
                        return Err(MarbleError::DuplicateUnsubscriptionPoint);
                    }
                    parsed.unsubscribed = Some(group_start.unwrap_or(frame));
                }
                symbol => match self.time_progression(&chars, i) {
                    Some((consumed, ms)) => {
                        i += consumed - 1;
                        next_frame = step(next_frame, ms)?;
                    }
                    None => {
                        return Err(MarbleError::IllegalSubscriptionChar { symbol, index: i });
                    }
                },
            }
            frame = next_frame;
            i += 1;
        }
        Ok(parsed)
    }

    /// Frames until the `|` marker.
    pub fn parse_time(&self, marbles: &str) -> Result<Frame, MarbleError> {
        let index = if self.run_mode {
            marbles.trim().chars().position(|c| c == '|')
        } else {
            marbles.chars().position(|c| c == '|')
        };
        index
            .map(|index| self.advance(index as Frame))
            .ok_or(MarbleError::MissingCompletion)
    }

    /// Match `<number>(ms|s|m) ` at `start`, returning characters consumed
    /// and whole milliseconds. Only in run mode, at the start or after a space.
    fn time_progression(&self, chars: &[char], start: usize) -> Option<(usize, Frame)> {
        if !self.run_mode || !chars[start].is_ascii_digit() {
            return None;
        }
        if start > 0 && chars[start - 1] != ' ' {
            return None;
        }
        let mut end = start;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
        if end < chars.len() && chars[end] == '.' {
            let fraction = end + 1;
            let mut after = fraction;
            while after < chars.len() && chars[after].is_ascii_digit() {
                after += 1;
            }
            if after > fraction {
                end = after;
            }
        }
        let number: String = chars[start..end].iter().collect();
        let rest = &chars[end..];
        let (unit_len, scale) = match rest {
            ['m', 's', ' ', ..] => (2, 1.0),
            ['s', ' ', ..] => (1, 1_000.0),
            ['m', ' ', ..] => (1, 60_000.0),
            _ => return None,
        };
        let duration: f64 = number.parse().ok()?;
        let ms = (duration * scale).round() as Frame;
        Some((end - start + unit_len + 1, ms))
    }
}

fn step(frame: Frame, by: Frame) -> Result<Frame, MarbleError> {
    frame.checked_add(by).ok_or(MarbleError::FrameOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Msg = TestMessage<String, String>;

    fn parse(marbles: &str) -> Vec<Msg> {
        MarbleParser::new().parse_marbles(marbles, None, None).unwrap()
    }

    fn run_parse(marbles: &str) -> Vec<Msg> {
        MarbleParser::new()
            .with_run_mode(true)
            .parse_marbles(marbles, None, None)
            .unwrap()
    }

    fn next(frame: Frame, value: &str) -> Msg {
        TestMessage::next(frame, value.to_string())
    }

    // =========================================================================
    // Notification diagrams
    // =========================================================================

    #[test]
    fn plain_diagram_frames() {
        assert_eq!(
            parse("--a--b--c--|"),
            vec![
                next(2, "a"),
                next(5, "b"),
                next(8, "c"),
                TestMessage::complete(11)
            ]
        );
    }

    #[test]
    fn groups_share_the_opening_frame() {
        assert_eq!(
            parse("-(ab|)-c"),
            vec![
                next(1, "a"),
                next(1, "b"),
                TestMessage::complete(1),
                next(7, "c")
            ]
        );
    }

    #[test]
    fn subscription_point_makes_earlier_frames_negative() {
        assert_eq!(
            parse("a-^-b-|"),
            vec![next(-2, "a"), next(2, "b"), TestMessage::complete(4)]
        );
    }

    #[test]
    fn group_before_subscription_point_keeps_negative_frame() {
        assert_eq!(parse("(ab)^-c"), vec![next(-4, "a"), next(-4, "b"), next(2, "c")]);
    }

    #[test]
    fn value_map_and_error_value() {
        let values = HashMap::from([('a', 10_u32), ('b', 20)]);
        let parsed = MarbleParser::new()
            .parse_marbles::<u32, String>("a-b-#", Some(&values), Some(&"bad".to_string()))
            .unwrap();
        assert_eq!(
            parsed,
            vec![
                TestMessage::next(0, 10),
                TestMessage::next(2, 20),
                TestMessage::error(4, "bad".to_string())
            ]
        );
    }

    #[test]
    fn default_error_value_is_error() {
        assert_eq!(parse("-#"), vec![TestMessage::error(1, "error".to_string())]);
    }

    #[test]
    fn digits_parse_without_value_map() {
        let parsed = MarbleParser::new()
            .parse_marbles::<u8, String>("1-2|", None, None)
            .unwrap();
        assert_eq!(parsed[1], TestMessage::next(2, 2));
    }

    #[test]
    fn missing_values_are_errors() {
        let err = MarbleParser::new()
            .parse_marbles::<u8, String>("-x|", None, None)
            .unwrap_err();
        assert_eq!(err, MarbleError::MissingValue('x'));
        assert!(
            MarbleParser::new()
                .parse_marbles::<u8, &'static str>("-#", None, None)
                .is_ok()
        );
        let err = MarbleParser::new()
            .parse_marbles::<String, u8>("-#", None, None)
            .unwrap_err();
        assert_eq!(err, MarbleError::MissingErrorValue);
    }

    #[test]
    fn unsubscription_marker_is_rejected() {
        let err = MarbleParser::new()
            .parse_marbles::<String, String>("-a-!", None, None)
            .unwrap_err();
        assert_eq!(err, MarbleError::UnsubscriptionInObservable);
    }

    #[test]
    fn frame_time_factor_scales_frames() {
        let parsed: Vec<Msg> = MarbleParser::new()
            .with_frame_time_factor(10)
            .parse_marbles("-a-|", None, None)
            .unwrap();
        assert_eq!(parsed, vec![next(10, "a"), TestMessage::complete(30)]);
    }

    // =========================================================================
    // Run mode
    // =========================================================================

    #[test]
    fn run_mode_ignores_spaces() {
        assert_eq!(
            run_parse("  -a - b|"),
            vec![next(1, "a"), next(3, "b"), TestMessage::complete(4)]
        );
    }

    #[test]
    fn run_mode_time_progression() {
        assert_eq!(
            run_parse("a 10ms b 1.5s c 1m |"),
            vec![
                next(0, "a"),
                next(11, "b"),
                next(1_512, "c"),
                TestMessage::complete(61_513)
            ]
        );
    }

    #[test]
    fn time_progression_requires_trailing_space() {
        assert_eq!(
            run_parse("10ms"),
            vec![next(0, "1"), next(1, "0"), next(2, "m"), next(3, "s")]
        );
    }

    #[test]
    fn digits_after_symbol_are_values_in_run_mode() {
        assert_eq!(
            run_parse("a5ms "),
            vec![next(0, "a"), next(1, "5"), next(2, "m"), next(3, "s")]
        );
    }

    #[test]
    fn oversized_time_progression_is_rejected() {
        let parser = MarbleParser::new().with_run_mode(true);
        assert_eq!(
            parser.parse_marbles::<String, String>("99999999999999999999ms a|", None, None),
            Err(MarbleError::FrameOverflow)
        );
        assert_eq!(
            parser.parse_subscription_marbles("^ 9223372036854775807ms !"),
            Err(MarbleError::FrameOverflow)
        );
    }

    #[test]
    fn outside_run_mode_no_time_progression() {
        assert_eq!(parse("1ms ").len(), 3);
    }

    // =========================================================================
    // Subscription diagrams and time
    // =========================================================================

    #[test]
    fn subscription_marbles() {
        let parser = MarbleParser::new();
        assert_eq!(
            parser.parse_subscription_marbles("--^--!").unwrap(),
            SubscriptionMarbles {
                subscribed: Some(2),
                unsubscribed: Some(5)
            }
        );
        assert_eq!(
            parser.parse_subscription_marbles("--(^!)").unwrap(),
            SubscriptionMarbles {
                subscribed: Some(2),
                unsubscribed: Some(2)
            }
        );
        assert_eq!(
            parser.parse_subscription_marbles("----").unwrap(),
            SubscriptionMarbles::default()
        );
    }

    #[test]
    fn unsubscription_marker_takes_no_frame() {
        let parsed = MarbleParser::new().parse_subscription_marbles("^!-!").unwrap_err();
        assert_eq!(parsed, MarbleError::DuplicateUnsubscriptionPoint);
        let parsed = MarbleParser::new().parse_subscription_marbles("-!^").unwrap();
        assert_eq!(parsed.unsubscribed, Some(1));
        assert_eq!(parsed.subscribed, Some(1));
    }

    #[test]
    fn subscription_marble_errors() {
        let parser = MarbleParser::new();
        assert_eq!(
            parser.parse_subscription_marbles("^-^").unwrap_err(),
            MarbleError::DuplicateSubscriptionPoint
        );
        assert_eq!(
            parser.parse_subscription_marbles("^-a").unwrap_err(),
            MarbleError::IllegalSubscriptionChar {
                symbol: 'a',
                index: 2
            }
        );
    }

    #[test]
    fn subscription_time_progression_in_run_mode() {
        let parser = MarbleParser::new().with_run_mode(true);
        assert_eq!(
            parser.parse_subscription_marbles("^ 20ms !").unwrap(),
            SubscriptionMarbles {
                subscribed: Some(0),
                unsubscribed: Some(21)
            }
        );
    }

    #[test]
    fn time_diagrams() {
        assert_eq!(MarbleParser::new().parse_time("---|"), Ok(3));
        assert_eq!(
            MarbleParser::new().with_frame_time_factor(10).parse_time("-|"),
            Ok(10)
        );
        assert_eq!(
            MarbleParser::new().with_run_mode(true).parse_time("  --|"),
            Ok(2)
        );
        assert_eq!(
            MarbleParser::new().parse_time("---"),
            Err(MarbleError::MissingCompletion)
        );
    }
}
