//! Bookkeeping of notes that were switched on and not yet switched off

use serde::Serialize;
use tracing::{debug, warn};

use crate::sink::{DeviceId, NoteSink};
use crate::track::TrackId;

/// A note that has been sent as note-on, tagged with the track that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenNote {
    pub owner: TrackId,
    pub device: DeviceId,
    pub channel: u8,
    pub pitch: u8,
}

impl OpenNote {
    /// Same physical voice, whichever track opened it
    pub fn same_voice(&self, other: &OpenNote) -> bool {
        self.device == other.device && self.channel == other.channel && self.pitch == other.pitch
    }
}

/// Stack of sounding notes shared by all tracks. Entries carry the
/// device/channel they were opened on, so reassigning a track never orphans a
/// note-off. A voice is held by at most one track at a time.
#[derive(Debug, Clone, Default)]
pub struct NoteLifetime {
    open_notes: Vec<OpenNote>,
}

impl NoteLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a note-on and remember it. A voice that is already sounding is
    /// closed first, even when another track opened it. Returns false if the
    /// sink rejected the note-on, in which case nothing is tracked.
    pub fn open(&mut self, sink: &mut dyn NoteSink, note: OpenNote, velocity: u8) -> bool {
        if let Some(pos) = self.open_notes.iter().rposition(|n| n.same_voice(&note)) {
            let held = self.open_notes.remove(pos);
            if held.owner != note.owner {
                debug!(from = held.owner.0, to = note.owner.0, pitch = note.pitch, "Voice taken over");
            }
            Self::send_off(sink, held);
        }

        match sink.send_note_on(note.device, note.channel, note.pitch, velocity) {
            Ok(()) => {
                self.open_notes.push(note);
                true
            }
            Err(e) => {
                warn!(device = %note.device, channel = note.channel, pitch = note.pitch, "Note-on skipped: {e}");
                false
            }
        }
    }

    /// Close every note `owner` holds, most recently opened first. Returns how
    /// many entries were released (including ones whose note-off failed).
    pub fn close_owned(&mut self, sink: &mut dyn NoteSink, owner: TrackId) -> usize {
        let mut count = 0;
        while let Some(pos) = self.open_notes.iter().rposition(|n| n.owner == owner) {
            let note = self.open_notes.remove(pos);
            Self::send_off(sink, note);
            count += 1;
        }
        count
    }

    /// Close every open note, most recently opened first
    pub fn close_all(&mut self, sink: &mut dyn NoteSink) -> usize {
        let count = self.open_notes.len();
        while let Some(note) = self.open_notes.pop() {
            Self::send_off(sink, note);
        }
        count
    }

    /// Close one voice if `note.owner` still holds it
    pub fn close(&mut self, sink: &mut dyn NoteSink, note: OpenNote) -> bool {
        let Some(pos) = self.open_notes.iter().rposition(|n| *n == note) else {
            return false;
        };
        self.open_notes.remove(pos);
        Self::send_off(sink, note);
        true
    }

    fn send_off(sink: &mut dyn NoteSink, note: OpenNote) {
        if let Err(e) = sink.send_note_off(note.device, note.channel, note.pitch) {
            warn!(device = %note.device, channel = note.channel, pitch = note.pitch, "Note-off dropped: {e}");
        }
    }

    pub fn open_notes(&self) -> &[OpenNote] {
        &self.open_notes
    }

    pub fn owned_by(&self, owner: TrackId) -> impl Iterator<Item = &OpenNote> {
        self.open_notes.iter().filter(move |n| n.owner == owner)
    }

    pub fn is_empty(&self) -> bool {
        self.open_notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.open_notes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CapturingSink, SinkEvent};

    const KICK: TrackId = TrackId(0);
    const CLAP: TrackId = TrackId(1);

    fn note(owner: TrackId, pitch: u8) -> OpenNote {
        OpenNote { owner, device: DeviceId(0), channel: 9, pitch }
    }

    fn off(pitch: u8) -> SinkEvent {
        SinkEvent::NoteOff { device: DeviceId(0), channel: 9, pitch }
    }

    #[test]
    fn test_close_all_is_lifo() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 36), 127);
        lifetime.open(&mut sink, note(KICK, 38), 127);
        sink.take_events();

        assert_eq!(lifetime.close_all(&mut sink), 2);
        let pitches: Vec<u8> = sink.events().iter().map(SinkEvent::pitch).collect();
        assert_eq!(pitches, vec![38, 36]);
        assert!(sink.events().iter().all(|e| !e.is_note_on()));
        assert!(lifetime.is_empty());
    }

    #[test]
    fn test_close_all_on_empty_sends_nothing() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        assert_eq!(lifetime.close_all(&mut sink), 0);
        assert_eq!(lifetime.close_owned(&mut sink, KICK), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_reopening_voice_closes_it_first() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 36), 127);
        lifetime.open(&mut sink, note(KICK, 36), 100);
        assert_eq!(lifetime.len(), 1);
        assert_eq!(sink.events()[1], off(36));
    }

    #[test]
    fn test_voice_taken_over_by_other_track() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 39), 127);
        lifetime.open(&mut sink, note(CLAP, 39), 127);
        assert_eq!(sink.take_events()[1], off(39));
        assert_eq!(lifetime.open_notes(), &[note(CLAP, 39)]);

        // the kick no longer holds the voice, so it must not cut the clap
        assert_eq!(lifetime.close_owned(&mut sink, KICK), 0);
        assert!(!lifetime.close(&mut sink, note(KICK, 39)));
        assert!(sink.events().is_empty());
        assert_eq!(lifetime.owned_by(CLAP).count(), 1);
    }

    #[test]
    fn test_close_owned_leaves_other_tracks() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 36), 127);
        lifetime.open(&mut sink, note(CLAP, 39), 127);
        lifetime.open(&mut sink, note(KICK, 40), 127);
        sink.take_events();

        assert_eq!(lifetime.close_owned(&mut sink, KICK), 2);
        assert_eq!(sink.take_events(), vec![off(40), off(36)]);
        assert_eq!(lifetime.open_notes(), &[note(CLAP, 39)]);
    }

    #[test]
    fn test_failed_note_on_is_not_tracked() {
        let mut sink = CapturingSink::new(1);
        sink.set_unavailable(DeviceId(0), true);
        let mut lifetime = NoteLifetime::new();
        assert!(!lifetime.open(&mut sink, note(KICK, 36), 127));
        assert!(lifetime.is_empty());
    }

    #[test]
    fn test_failed_note_off_drops_entry() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 36), 127);
        sink.set_unavailable(DeviceId(0), true);
        assert_eq!(lifetime.close_all(&mut sink), 1);
        assert!(lifetime.is_empty());
    }

    #[test]
    fn test_close_single_voice() {
        let mut sink = CapturingSink::new(1);
        let mut lifetime = NoteLifetime::new();
        lifetime.open(&mut sink, note(KICK, 36), 127);
        lifetime.open(&mut sink, note(KICK, 40), 127);
        assert!(lifetime.close(&mut sink, note(KICK, 36)));
        assert!(!lifetime.close(&mut sink, note(KICK, 36)));
        assert_eq!(lifetime.open_notes(), &[note(KICK, 40)]);
    }
}
