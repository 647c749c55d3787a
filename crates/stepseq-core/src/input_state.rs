//! Top-level UI mode gating which user actions are legal

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequencerError};
use crate::sink::DeviceId;
use crate::track::TrackId;

/// The pending track lives inside the `InstrumentSelect` variant, so it
/// exists exactly while that mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputMode {
    #[default]
    Regular,
    StepLengthSelect,
    InstrumentSelect { track: TrackId },
}

/// Choice confirmed in the instrument picker. `None` keeps the track's
/// current value; a missing note falls back to the learned note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstrumentChoice {
    pub device: Option<DeviceId>,
    pub channel: Option<u8>,
    pub note: Option<u8>,
}

/// Result of pressing a track's select-instrument control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentSelectPress {
    Opened(TrackId),
    Cancelled(TrackId),
}

/// How a grid edit on a track is treated in the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEditGate {
    Allowed,
    /// The track is waiting for an instrument choice
    Suppressed,
    /// Another track holds the instrument picker
    Rejected(TrackId),
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    mode: InputMode,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn pending_track(&self) -> Option<TrackId> {
        match self.mode {
            InputMode::InstrumentSelect { track } => Some(track),
            _ => None,
        }
    }

    /// Step-length-select button
    pub fn step_length_select_pressed(&mut self) -> Result<InputMode> {
        self.mode = match self.mode {
            InputMode::Regular => InputMode::StepLengthSelect,
            InputMode::StepLengthSelect => InputMode::Regular,
            InputMode::InstrumentSelect { track } => {
                return Err(SequencerError::invalid(format!(
                    "step length select while instrument select is pending for track {}",
                    track.0
                )));
            }
        };
        Ok(self.mode)
    }

    /// A step length was chosen
    pub fn max_steps_set(&mut self) {
        if self.mode == InputMode::StepLengthSelect {
            self.mode = InputMode::Regular;
        }
    }

    /// A track's select-instrument control. Pressing it again for the pending
    /// track cancels the selection.
    pub fn select_instrument_pressed(&mut self, track: TrackId) -> Result<InstrumentSelectPress> {
        match self.mode {
            InputMode::Regular => {
                self.mode = InputMode::InstrumentSelect { track };
                Ok(InstrumentSelectPress::Opened(track))
            }
            InputMode::InstrumentSelect { track: pending } if pending == track => {
                self.mode = InputMode::Regular;
                Ok(InstrumentSelectPress::Cancelled(track))
            }
            InputMode::InstrumentSelect { track: pending } => Err(SequencerError::invalid(format!(
                "instrument select is pending for track {}",
                pending.0
            ))),
            InputMode::StepLengthSelect => Err(SequencerError::invalid("instrument select during step length select")),
        }
    }

    /// Leave instrument select, returning the track that was pending
    pub fn finish_instrument_select(&mut self) -> Option<TrackId> {
        let track = self.pending_track()?;
        self.mode = InputMode::Regular;
        Some(track)
    }

    pub fn grid_edit_gate(&self, track: TrackId) -> GridEditGate {
        match self.mode {
            InputMode::InstrumentSelect { track: pending } if pending == track => GridEditGate::Suppressed,
            InputMode::InstrumentSelect { track: pending } => GridEditGate::Rejected(pending),
            _ => GridEditGate::Allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_length_select_toggles() {
        let mut input = InputState::new();
        assert_eq!(input.step_length_select_pressed().unwrap(), InputMode::StepLengthSelect);
        assert_eq!(input.step_length_select_pressed().unwrap(), InputMode::Regular);
        input.step_length_select_pressed().unwrap();
        input.max_steps_set();
        assert_eq!(input.mode(), InputMode::Regular);
    }

    #[test]
    fn test_pending_track_only_in_instrument_select() {
        let mut input = InputState::new();
        assert_eq!(input.pending_track(), None);
        input.select_instrument_pressed(TrackId(2)).unwrap();
        assert_eq!(input.pending_track(), Some(TrackId(2)));
        assert_eq!(input.finish_instrument_select(), Some(TrackId(2)));
        assert_eq!(input.pending_track(), None);
        assert_eq!(input.finish_instrument_select(), None);
    }

    #[test]
    fn test_second_press_cancels() {
        let mut input = InputState::new();
        input.select_instrument_pressed(TrackId(1)).unwrap();
        assert_eq!(
            input.select_instrument_pressed(TrackId(1)).unwrap(),
            InstrumentSelectPress::Cancelled(TrackId(1))
        );
        assert_eq!(input.mode(), InputMode::Regular);
    }

    #[test]
    fn test_other_track_rejected_while_pending() {
        let mut input = InputState::new();
        input.select_instrument_pressed(TrackId(1)).unwrap();
        assert!(input.select_instrument_pressed(TrackId(3)).is_err());
        assert!(input.step_length_select_pressed().is_err());
        assert_eq!(input.pending_track(), Some(TrackId(1)));
    }

    #[test]
    fn test_grid_edit_gate() {
        let mut input = InputState::new();
        assert_eq!(input.grid_edit_gate(TrackId(0)), GridEditGate::Allowed);
        input.select_instrument_pressed(TrackId(0)).unwrap();
        assert_eq!(input.grid_edit_gate(TrackId(0)), GridEditGate::Suppressed);
        assert_eq!(input.grid_edit_gate(TrackId(1)), GridEditGate::Rejected(TrackId(0)));
    }
}
