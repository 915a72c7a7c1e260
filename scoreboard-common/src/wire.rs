use crate::game_state::{GameState, RawState};
use serde_derive::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 54545;

/// Largest datagram we expect to see from a peer
pub const MAX_PACKET_LEN: usize = 2048;

/// The JSON object exchanged between instances. The clock travels as the
/// text a console would show, so any peer can read it.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct WirePacket {
    pub home_score: u16,
    pub visitor_score: u16,
    pub shot: u8,
    pub home_fouls: u8,
    pub visitor_fouls: u8,
    pub period: u8,
    pub clock: String,
}

impl From<&GameState> for WirePacket {
    fn from(state: &GameState) -> Self {
        Self {
            home_score: state.home_score,
            visitor_score: state.visitor_score,
            shot: state.shot_clock,
            home_fouls: state.home_fouls,
            visitor_fouls: state.visitor_fouls,
            period: state.period,
            clock: state.clock.encode(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Failed to serialize packet: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Payload is JSON but not an object (found {0})")]
    NotAnObject(&'static str),
}

pub fn encode(state: &GameState) -> Result<Vec<u8>, EncodingError> {
    Ok(serde_json::to_vec(&WirePacket::from(state))?)
}

/// Parses a datagram into a raw field mapping. Field values are left
/// untouched, normalization happens later.
pub fn decode(bytes: &[u8]) -> Result<RawState, DecodingError> {
    match serde_json::from_slice(bytes)? {
        Value::Object(map) => Ok(map),
        Value::Null => Err(DecodingError::NotAnObject("null")),
        Value::Bool(_) => Err(DecodingError::NotAnObject("a boolean")),
        Value::Number(_) => Err(DecodingError::NotAnObject("a number")),
        Value::String(_) => Err(DecodingError::NotAnObject("a string")),
        Value::Array(_) => Err(DecodingError::NotAnObject("an array")),
    }
}
