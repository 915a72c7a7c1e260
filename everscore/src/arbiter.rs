use crate::{
    mode_state::{ModeSnapshot, ModeState},
    publisher::{Publisher, Route},
};
use log::*;
use scoreboard_common::game_state::{GameState, RawState};
use std::{
    net::IpAddr,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Hardware,
    Network,
    /// The operator pushing what the board currently shows
    Operator,
}

/// What happened to one incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped by the peer filter before anything else looked at it
    Filtered,
    /// Not authoritative in the current mode
    Ignored,
    Published(Route),
}

/// The mode table.
///
/// | auto  | send  | hardware          | network | operator push |
/// |-------|-------|-------------------|---------|---------------|
/// | true  | true  | render + transmit | -       | -             |
/// | true  | false | render            | render  | -             |
/// | false | true  | -                 | -       | transmit      |
/// | false | false | -                 | -       | -             |
pub fn route_for(source: Source, modes: &ModeSnapshot) -> Route {
    match (source, modes.auto, modes.send) {
        (Source::Hardware, true, true) => Route::RENDER_AND_TRANSMIT,
        (Source::Hardware, true, false) => Route::RENDER,
        (Source::Network, true, false) => Route::RENDER,
        (Source::Operator, false, true) => Route::TRANSMIT,
        _ => Route::NOWHERE,
    }
}

/// Applies the mode table to events from every source.
///
/// Decisions are serialized: each event is routed and published against one
/// mode snapshot before the next event from any source is looked at.
pub struct StateArbiter {
    modes: Arc<ModeState>,
    publisher: Publisher,
    decision: Mutex<()>,
}

impl StateArbiter {
    pub fn new(modes: Arc<ModeState>, publisher: Publisher) -> Self {
        Self {
            modes,
            publisher,
            decision: Mutex::new(()),
        }
    }

    /// Called on the hardware thread for every console update
    pub fn on_hardware(&self, raw: &RawState) -> Outcome {
        let _guard = self.decision.lock().unwrap_or_else(PoisonError::into_inner);
        let modes = self.modes.snapshot();
        self.arbitrate(Source::Hardware, &modes, || GameState::normalize(raw))
    }

    /// Called on the network thread for every well formed packet
    pub fn on_network(&self, raw: &RawState, sender: IpAddr) -> Outcome {
        let _guard = self.decision.lock().unwrap_or_else(PoisonError::into_inner);
        let modes = self.modes.snapshot();
        if !modes.accepts_peer(sender) {
            debug!("Ignoring packet from {sender}, only accepting {modes}");
            return Outcome::Filtered;
        }
        self.arbitrate(Source::Network, &modes, || GameState::normalize(raw))
    }

    /// Called on the main loop with the state read back from the board
    pub fn on_operator_push(&self, state: GameState) -> Outcome {
        let _guard = self.decision.lock().unwrap_or_else(PoisonError::into_inner);
        let modes = self.modes.snapshot();
        self.arbitrate(Source::Operator, &modes, || state)
    }

    fn arbitrate<F>(&self, source: Source, modes: &ModeSnapshot, state: F) -> Outcome
    where
        F: FnOnce() -> GameState,
    {
        let route = route_for(source, modes);
        if route.is_nowhere() {
            trace!("{source:?} event ignored in mode {modes}");
            return Outcome::Ignored;
        }

        let state = state();
        debug!("{source:?} event accepted in mode {modes}, routing {route:?}: {state:?}");
        self.publisher.publish(&state, route);
        Outcome::Published(route)
    }
}
