use log::*;
use scoreboard_common::{
    clock::ClockRepresentation,
    game_state::{Digit, GameState, ScoreboardDigits},
};
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    // The headless board never loses its display
    #[cfg_attr(not(test), allow(dead_code))]
    #[error("Renderer is not bound: {0}")]
    Unbound(String),
}

/// A display surface that shows the full digit set.
pub trait Renderer {
    /// Attaches to the display. May be retried any number of times.
    fn bind(&mut self) -> Result<(), RenderError>;

    fn show(&mut self, digits: &ScoreboardDigits) -> Result<(), RenderError>;

    /// The digits currently on the display, if it has shown anything
    fn displayed(&self) -> Option<ScoreboardDigits>;
}

/// Wraps a renderer so that a missing display is reported once and then
/// silently retried with every update until it comes back.
pub struct RenderTarget<R> {
    renderer: R,
    bound: bool,
    failure_reported: bool,
}

impl<R: Renderer> RenderTarget<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            bound: false,
            failure_reported: false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn displayed(&self) -> Option<ScoreboardDigits> {
        self.renderer.displayed()
    }

    pub fn update(&mut self, state: &GameState) {
        if !self.bound {
            match self.renderer.bind() {
                Ok(()) => {
                    if self.failure_reported {
                        info!("Display is available again");
                    }
                    self.bound = true;
                    self.failure_reported = false;
                }
                Err(e) => {
                    self.report(e);
                    return;
                }
            }
        }

        if let Err(e) = self.renderer.show(&state.digits()) {
            self.bound = false;
            self.report(e);
        }
    }

    fn report(&mut self, e: RenderError) {
        if !self.failure_reported {
            error!("Display unavailable, updates are dropped until it returns: {e}");
            self.failure_reported = true;
        }
    }
}

/// Headless renderer that keeps the displayed digits in memory and logs the
/// board as one line.
#[derive(Debug)]
pub struct BoardRenderer {
    digits: ScoreboardDigits,
}

impl BoardRenderer {
    pub fn new() -> Self {
        Self {
            digits: GameState::default().digits(),
        }
    }
}

impl Default for BoardRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BoardRenderer {
    fn bind(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    fn show(&mut self, digits: &ScoreboardDigits) -> Result<(), RenderError> {
        self.digits = *digits;
        info!("{}", board_line(digits));
        Ok(())
    }

    fn displayed(&self) -> Option<ScoreboardDigits> {
        Some(self.digits)
    }
}

fn cell(digit: Digit) -> char {
    if digit.visible {
        char::from(b'0' + digit.value)
    } else {
        ' '
    }
}

fn digits_text(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

pub fn board_line(digits: &ScoreboardDigits) -> String {
    let clock = &digits.clock;
    let clock_text = match ClockRepresentation::from(clock) {
        ClockRepresentation::Standard { .. } => format!(
            "{}{}:{}{}",
            cell(clock.minutes_tens),
            cell(clock.minutes_ones),
            cell(clock.seconds_tens),
            cell(clock.seconds_ones)
        ),
        ClockRepresentation::Fast { .. } => format!(
            "{}{}.{}",
            cell(clock.fast_tens),
            cell(clock.fast_ones),
            cell(clock.fast_tenths)
        ),
        ClockRepresentation::Unknown => "--".to_string(),
    };

    let mut line = String::new();
    let _ = write!(
        line,
        "HOME {} VISITOR {} | CLOCK {clock_text} | SHOT {} | PERIOD {} | FOULS {}-{}",
        digits_text(&digits.home_score),
        digits_text(&digits.visitor_score),
        digits_text(&digits.shot_clock),
        digits.period,
        digits_text(&digits.home_fouls),
        digits_text(&digits.visitor_fouls),
    );
    line
}
