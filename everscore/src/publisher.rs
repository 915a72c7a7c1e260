use crate::{app::AppMessage, network::NetworkError};
use crossbeam_channel::Sender;
use log::*;
use scoreboard_common::game_state::GameState;
use std::sync::Arc;

/// Where an accepted state should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Route {
    pub render: bool,
    pub transmit: bool,
}

impl Route {
    pub const NOWHERE: Self = Self {
        render: false,
        transmit: false,
    };
    pub const RENDER: Self = Self {
        render: true,
        transmit: false,
    };
    pub const TRANSMIT: Self = Self {
        render: false,
        transmit: true,
    };
    pub const RENDER_AND_TRANSMIT: Self = Self {
        render: true,
        transmit: true,
    };

    pub fn is_nowhere(&self) -> bool {
        !self.render && !self.transmit
    }
}

/// Anything that can put a state on the wire
pub trait Transmit: Send + Sync {
    fn transmit(&self, state: &GameState) -> Result<(), NetworkError>;
}

/// Fans an accepted state out to the main loop and/or the network.
pub struct Publisher {
    render_tx: Sender<AppMessage>,
    network: Arc<dyn Transmit>,
}

impl Publisher {
    pub fn new(render_tx: Sender<AppMessage>, network: Arc<dyn Transmit>) -> Self {
        Self { render_tx, network }
    }

    pub fn publish(&self, state: &GameState, route: Route) {
        if route.render && self.render_tx.send(AppMessage::Render(*state)).is_err() {
            warn!("Main loop has stopped, dropping display update");
        }

        if route.transmit {
            if let Err(e) = self.network.transmit(state) {
                error!("Failed to send state to peers: {e}");
            }
        }
    }
}
