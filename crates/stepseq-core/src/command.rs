//! Closed set of user/MIDI-input actions applied by the engine

use serde::{Deserialize, Serialize};

use crate::input_state::InstrumentChoice;
use crate::midi::MidiMessage;
use crate::sink::DeviceId;
use crate::track::TrackId;
use crate::transport::TransportButton;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Raw click on a step; meaning depends on the input mode
    StepPressed { track: TrackId, step: usize },
    ToggleStep { track: TrackId, step: usize },
    SetMaxSteps { track: TrackId, steps: usize },
    SetMute { track: TrackId, muted: bool },
    ToggleMute { track: TrackId },
    SetNote { track: TrackId, note: u8 },
    SetChannel { track: TrackId, channel: u8 },
    SetDevice { track: TrackId, device: DeviceId },
    SetArpeggiator { track: TrackId, enabled: bool },
    SelectLane { track: TrackId, lane: usize },
    StepLengthSelect,
    /// Open (or, for the pending track, cancel) the instrument picker
    SelectInstrument { track: TrackId },
    ConfirmInstrument(InstrumentChoice),
    Transport(TransportButton),
    /// Note received from the external MIDI input
    ExternalNote(MidiMessage),
}

impl Command {
    /// Track this command targets, if any
    pub fn track(&self) -> Option<TrackId> {
        match *self {
            Self::StepPressed { track, .. }
            | Self::ToggleStep { track, .. }
            | Self::SetMaxSteps { track, .. }
            | Self::SetMute { track, .. }
            | Self::ToggleMute { track }
            | Self::SetNote { track, .. }
            | Self::SetChannel { track, .. }
            | Self::SetDevice { track, .. }
            | Self::SetArpeggiator { track, .. }
            | Self::SelectLane { track, .. }
            | Self::SelectInstrument { track } => Some(track),
            Self::StepLengthSelect | Self::ConfirmInstrument(_) | Self::Transport(_) | Self::ExternalNote(_) => None,
        }
    }
}
