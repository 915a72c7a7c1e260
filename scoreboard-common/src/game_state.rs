use crate::clock::{ClockRepresentation, ZERO_CLOCK};
use log::*;
use serde_json::{Map, Value};

/// Field mapping as produced by a console decoder or received from a peer.
/// Values are loosely typed, see [`GameState::normalize`].
pub type RawState = Map<String, Value>;

pub const MAX_SCORE: u16 = 999;
pub const MAX_SMALL_COUNT: u8 = 99;

pub mod keys {
    pub const HOME_SCORE: &str = "home_score";
    pub const VISITOR_SCORE: &str = "visitor_score";
    pub const SHOT: &str = "shot";
    pub const HOME_FOULS: &str = "home_fouls";
    pub const VISITOR_FOULS: &str = "visitor_fouls";
    pub const PERIOD: &str = "period";
    pub const CLOCK: &str = "clock";
}

/// Canonical snapshot of everything the board shows.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct GameState {
    pub home_score: u16,
    pub visitor_score: u16,
    pub shot_clock: u8,
    pub home_fouls: u8,
    pub visitor_fouls: u8,
    pub period: u8,
    pub clock: ClockRepresentation,
}

impl GameState {
    /// Coerces a raw field mapping into a fully populated state.
    ///
    /// Never fails: numeric fields that can't be read as integers become 0,
    /// out of range values are clamped, the period is the first decimal digit
    /// of its text form, and a missing clock reads as `0:00`.
    pub fn normalize(raw: &RawState) -> Self {
        let state = Self {
            home_score: coerce_clamped(raw.get(keys::HOME_SCORE), MAX_SCORE.into()) as u16,
            visitor_score: coerce_clamped(raw.get(keys::VISITOR_SCORE), MAX_SCORE.into()) as u16,
            shot_clock: coerce_clamped(raw.get(keys::SHOT), MAX_SMALL_COUNT.into()) as u8,
            home_fouls: coerce_clamped(raw.get(keys::HOME_FOULS), MAX_SMALL_COUNT.into()) as u8,
            visitor_fouls: coerce_clamped(raw.get(keys::VISITOR_FOULS), MAX_SMALL_COUNT.into())
                as u8,
            period: first_digit(&period_text(raw.get(keys::PERIOD))),
            clock: ClockRepresentation::decode(&clock_text(raw.get(keys::CLOCK))),
        };
        trace!("Normalized {raw:?} to {state:?}");
        state
    }

    pub fn digits(&self) -> ScoreboardDigits {
        ScoreboardDigits {
            home_score: decompose(self.home_score),
            visitor_score: decompose(self.visitor_score),
            shot_clock: decompose_small(self.shot_clock),
            home_fouls: decompose_small(self.home_fouls),
            visitor_fouls: decompose_small(self.visitor_fouls),
            period: self.period,
            clock: self.clock.into(),
        }
    }

    /// Rebuilds a state from what a board is currently displaying.
    pub fn from_digits(digits: &ScoreboardDigits) -> Self {
        Self {
            home_score: recompose(digits.home_score),
            visitor_score: recompose(digits.visitor_score),
            shot_clock: recompose_small(digits.shot_clock),
            home_fouls: recompose_small(digits.home_fouls),
            visitor_fouls: recompose_small(digits.visitor_fouls),
            period: digits.period % 10,
            clock: (&digits.clock).into(),
        }
    }
}

/// Splits a score into hundreds, tens and ones
pub fn decompose(value: u16) -> [u8; 3] {
    [
        ((value / 100) % 10) as u8,
        ((value / 10) % 10) as u8,
        (value % 10) as u8,
    ]
}

pub fn recompose(digits: [u8; 3]) -> u16 {
    let [hundreds, tens, ones] = digits;
    100 * hundreds as u16 + 10 * tens as u16 + ones as u16
}

pub fn decompose_small(value: u8) -> [u8; 2] {
    [(value / 10) % 10, value % 10]
}

pub fn recompose_small(digits: [u8; 2]) -> u8 {
    let [tens, ones] = digits;
    10 * (tens % 10) + ones % 10
}

fn coerce_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Bool(b)) => *b as i64,
        Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) | None => 0,
    }
}

fn coerce_clamped(value: Option<&Value>, max: i64) -> i64 {
    coerce_int(value).clamp(0, max)
}

fn period_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn clock_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => ZERO_CLOCK.to_string(),
        Some(other) => other.to_string(),
    }
}

fn first_digit(text: &str) -> u8 {
    text.chars()
        .find_map(|c| c.to_digit(10))
        .map_or(0, |d| d as u8)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Digit {
    pub value: u8,
    pub visible: bool,
}

impl Digit {
    pub const HIDDEN: Self = Self {
        value: 0,
        visible: false,
    };

    pub fn shown(value: u8) -> Self {
        Self {
            value,
            visible: true,
        }
    }
}

/// Every clock cell on the board. Only the cells of the active clock layout
/// are visible.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ClockDigits {
    pub minutes_tens: Digit,
    pub minutes_ones: Digit,
    pub seconds_tens: Digit,
    pub seconds_ones: Digit,
    pub fast_tens: Digit,
    pub fast_ones: Digit,
    pub fast_tenths: Digit,
}

impl From<ClockRepresentation> for ClockDigits {
    fn from(clock: ClockRepresentation) -> Self {
        match clock {
            ClockRepresentation::Standard {
                minutes_tens_visible,
                minutes_tens,
                minutes_ones,
                seconds_tens,
                seconds_ones,
            } => Self {
                minutes_tens: if minutes_tens_visible {
                    Digit::shown(minutes_tens)
                } else {
                    Digit::HIDDEN
                },
                minutes_ones: Digit::shown(minutes_ones),
                seconds_tens: Digit::shown(seconds_tens),
                seconds_ones: Digit::shown(seconds_ones),
                ..Default::default()
            },
            ClockRepresentation::Fast {
                tens,
                ones,
                tenths,
            } => Self {
                fast_tens: Digit::shown(tens),
                fast_ones: Digit::shown(ones),
                fast_tenths: Digit::shown(tenths),
                ..Default::default()
            },
            ClockRepresentation::Unknown => Default::default(),
        }
    }
}

impl From<&ClockDigits> for ClockRepresentation {
    fn from(digits: &ClockDigits) -> Self {
        if digits.fast_ones.visible {
            Self::Fast {
                tens: digits.fast_tens.value,
                ones: digits.fast_ones.value,
                tenths: digits.fast_tenths.value,
            }
        } else if digits.minutes_ones.visible {
            Self::Standard {
                minutes_tens_visible: digits.minutes_tens.visible,
                minutes_tens: if digits.minutes_tens.visible {
                    digits.minutes_tens.value
                } else {
                    0
                },
                minutes_ones: digits.minutes_ones.value,
                seconds_tens: digits.seconds_tens.value,
                seconds_ones: digits.seconds_ones.value,
            }
        } else {
            Self::Unknown
        }
    }
}

/// The fully decomposed digit set handed to a renderer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ScoreboardDigits {
    pub home_score: [u8; 3],
    pub visitor_score: [u8; 3],
    pub shot_clock: [u8; 2],
    pub home_fouls: [u8; 2],
    pub visitor_fouls: [u8; 2],
    pub period: u8,
    pub clock: ClockDigits,
}
