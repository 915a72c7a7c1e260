/// Structured form of the game clock, as shown on the board.
///
/// The variant is chosen by the separator found in the console's clock text:
/// `:` selects the minutes/seconds layout, `.` the sub-minute layout with
/// tenths. Anything else blanks the clock.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClockRepresentation {
    Standard {
        minutes_tens_visible: bool,
        /// Only meaningful when `minutes_tens_visible` is set, 0 otherwise
        minutes_tens: u8,
        minutes_ones: u8,
        seconds_tens: u8,
        seconds_ones: u8,
    },
    Fast {
        tens: u8,
        ones: u8,
        tenths: u8,
    },
    Unknown,
}

impl Default for ClockRepresentation {
    fn default() -> Self {
        Self::decode(ZERO_CLOCK)
    }
}

/// Clock text used when the console doesn't report a clock at all
pub const ZERO_CLOCK: &str = "0:00";

impl ClockRepresentation {
    pub fn decode(raw: &str) -> Self {
        if let Some((secs, tenths)) = raw.split_once('.') {
            let secs = tolerant_int(secs);
            Self::Fast {
                tens: secs.div_euclid(10).rem_euclid(10) as u8,
                ones: secs.rem_euclid(10) as u8,
                tenths: tenths.chars().next().map_or(0, digit_value),
            }
        } else if let Some((mins, secs)) = raw.split_once(':') {
            let secs = format!("{secs:0>2}");
            let mut secs = secs.chars();
            let minutes_tens_visible = mins.chars().count() == 2;

            Self::Standard {
                minutes_tens_visible,
                minutes_tens: if minutes_tens_visible {
                    mins.chars().next().map_or(0, digit_value)
                } else {
                    0
                },
                minutes_ones: mins.chars().last().map_or(0, digit_value) % 10,
                seconds_tens: secs.next().map_or(0, digit_value),
                seconds_ones: secs.next().map_or(0, digit_value),
            }
        } else {
            Self::Unknown
        }
    }

    /// Rebuilds clock text from the displayed fields.
    ///
    /// This is not an exact inverse of [`decode`](Self::decode): a hidden
    /// tens-of-minutes digit always produces a single-digit minute string, and
    /// a fast clock is written without leading zeros.
    pub fn encode(&self) -> String {
        match *self {
            Self::Standard {
                minutes_tens_visible: true,
                minutes_tens,
                minutes_ones,
                seconds_tens,
                seconds_ones,
            } => format!("{minutes_tens}{minutes_ones}:{seconds_tens}{seconds_ones}"),
            Self::Standard {
                minutes_tens_visible: false,
                minutes_ones,
                seconds_tens,
                seconds_ones,
                ..
            } => format!("{minutes_ones}:{seconds_tens}{seconds_ones}"),
            Self::Fast {
                tens,
                ones,
                tenths,
            } => format!("{}.{tenths}", tens as u16 * 10 + ones as u16),
            Self::Unknown => String::new(),
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, Self::Standard { .. })
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast { .. })
    }
}

fn tolerant_int(text: &str) -> i128 {
    text.trim().parse().unwrap_or(0)
}

fn digit_value(c: char) -> u8 {
    c.to_digit(10).map_or(0, |d| d as u8)
}
