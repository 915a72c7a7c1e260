use crate::{
    arbiter::{Outcome, StateArbiter},
    mode_state::ModeState,
    operator::OperatorCommand,
    render::{RenderTarget, Renderer, board_line},
};
use crossbeam_channel::Receiver;
use log::*;
use scoreboard_common::game_state::GameState;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    /// An accepted state to put on the board
    Render(GameState),
    Operator(OperatorCommand),
    Quit,
}

/// The render/main loop. It is the only place the board is touched and the
/// only writer of the mode state.
pub struct App<R> {
    modes: Arc<ModeState>,
    arbiter: Arc<StateArbiter>,
    target: RenderTarget<R>,
    rx: Receiver<AppMessage>,
}

impl<R: Renderer> App<R> {
    pub fn new(
        modes: Arc<ModeState>,
        arbiter: Arc<StateArbiter>,
        renderer: R,
        rx: Receiver<AppMessage>,
    ) -> Self {
        Self {
            modes,
            arbiter,
            target: RenderTarget::new(renderer),
            rx,
        }
    }

    /// Runs until told to quit or every sender is gone
    pub fn run(&mut self) {
        info!("Starting in mode {}", self.modes.snapshot());
        while let Ok(msg) = self.rx.recv() {
            if !self.handle(msg) {
                break;
            }
        }
        info!("Main loop stopped");
    }

    /// Returns `false` once the app should stop
    pub fn handle(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Render(state) => self.target.update(&state),
            AppMessage::Operator(cmd) => return self.handle_command(cmd),
            AppMessage::Quit => return false,
        }
        true
    }

    fn handle_command(&mut self, cmd: OperatorCommand) -> bool {
        match cmd {
            OperatorCommand::SetAuto(auto) => {
                self.modes.set_auto(auto);
                info!("Mode changed to {}", self.modes.snapshot());
            }
            OperatorCommand::SetSend(send) => {
                self.modes.set_send(send);
                info!("Mode changed to {}", self.modes.snapshot());
            }
            OperatorCommand::SetPeerFilter(filter) => {
                self.modes.set_peer_filter(filter.as_deref());
                info!("Mode changed to {}", self.modes.snapshot());
            }
            OperatorCommand::Push => self.push(),
            OperatorCommand::Status => {
                println!("mode: {}", self.modes.snapshot());
                match self.target.displayed() {
                    Some(digits) => println!("board: {}", board_line(&digits)),
                    None => println!("board: nothing displayed"),
                }
                if !self.target.is_bound() {
                    println!("display: not bound, waiting for the next update to retry");
                }
            }
            OperatorCommand::Quit => return false,
        }
        true
    }

    fn push(&mut self) {
        let Some(digits) = self.target.displayed() else {
            warn!("Nothing is displayed, there is no state to push");
            return;
        };
        let state = GameState::from_digits(&digits);
        match self.arbiter.on_operator_push(state) {
            Outcome::Published(_) => info!("Pushed displayed state to peers"),
            _ => warn!(
                "Push ignored in mode {}, switch to manual and send first",
                self.modes.snapshot()
            ),
        }
    }
}
