pub mod clock;

pub mod config;

pub mod game_state;

pub mod wire;
