//! Core data models for the cup.

mod commentary;
mod ids;
mod match_record;
mod pairing;
mod player;
mod team;
mod tournament;

pub use commentary::*;
pub use ids::*;
pub use match_record::*;
pub use pairing::*;
pub use player::*;
pub use team::*;
pub use tournament::*;

use thiserror::Error;

/// Malformed or out-of-range input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
