//! Error types for stepseq

use thiserror::Error;

use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("MIDI output error: {0}")]
    Sink(#[from] SinkError),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Track not found: {0}")]
    TrackNotFound(usize),
}

impl SequencerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
