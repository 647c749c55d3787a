//! MIDI channel-voice messages used by the sequencer

use serde::{Deserialize, Serialize};

pub const MAX_CHANNEL: u8 = 15;
pub const MAX_PITCH: u8 = 127;

const NOTE_OFF_STATUS: u8 = 0x80;
const NOTE_ON_STATUS: u8 = 0x90;

/// A note message received from or sent to a MIDI port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiMessage {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub is_note_on: bool,
}

impl MidiMessage {
    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self { channel, pitch, velocity, is_note_on: true }
    }

    pub fn note_off(channel: u8, pitch: u8) -> Self {
        Self { channel, pitch, velocity: 0, is_note_on: false }
    }

    /// Parse raw bytes. Only note-on/note-off are recognised; a note-on with
    /// velocity 0 is reported as a note-off.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let [status, pitch, velocity, ..] = *bytes else {
            return None;
        };
        let channel = status & 0x0F;
        let (pitch, velocity) = (pitch & 0x7F, velocity & 0x7F);

        match status & 0xF0 {
            NOTE_ON_STATUS if velocity > 0 => Some(Self::note_on(channel, pitch, velocity)),
            NOTE_ON_STATUS | NOTE_OFF_STATUS => Some(Self::note_off(channel, pitch)),
            _ => None,
        }
    }

    /// Wire encoding. Note-offs always use the NOTE_OFF status.
    pub fn to_bytes(&self) -> [u8; 3] {
        let channel = self.channel & 0x0F;
        if self.starts_note() {
            [NOTE_ON_STATUS | channel, self.pitch & 0x7F, self.velocity & 0x7F]
        } else {
            [NOTE_OFF_STATUS | channel, self.pitch & 0x7F, 0]
        }
    }

    /// True for a note-on that actually starts a note (velocity > 0)
    pub fn starts_note(&self) -> bool {
        self.is_note_on && self.velocity > 0
    }
}

/// Human readable pitch name, e.g. 60 -> "C4"
pub fn note_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}
