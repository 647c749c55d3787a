//! Track model: a step grid plus everything needed to turn it into notes

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::arpeggiator::Arpeggiator;
use crate::error::{Result, SequencerError};
use crate::loop_recorder::LoopRecorder;
use crate::midi::{MAX_CHANNEL, MAX_PITCH, MidiMessage};
use crate::note_lifetime::{NoteLifetime, OpenNote};
use crate::sink::{DeviceId, NoteSink};
use crate::step_grid::{MAX_PARALLEL_NOTES, StepGrid};
use crate::transport::PlayStatus;

/// Track index within the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub usize);

/// Where externally received notes go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputRoute {
    #[default]
    Normal,
    /// The next note-on becomes the candidate pitch for instrument assignment
    NoteLearn,
}

/// Drawable per-track state, copied out at a tick boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRenderState {
    pub name: String,
    pub cursor: usize,
    pub active: Vec<bool>,
    /// Loop length; the step with this index is the length marker
    pub max_step: usize,
    pub steps_per_beat: usize,
    pub muted: bool,
    pub looper: bool,
    pub recording: bool,
    pub learning: bool,
    pub arp_enabled: bool,
    pub device: DeviceId,
    pub channel: u8,
    pub note: u8,
}

#[derive(Debug, Clone)]
pub struct TrackModel {
    id: TrackId,
    name: String,
    grid: StepGrid,
    arp: Arpeggiator,
    /// Only looper tracks capture external input
    recorder: Option<LoopRecorder>,
    device: DeviceId,
    channel: u8,
    /// Pitch written by `toggle_step`
    note: u8,
    velocity: u8,
    muted: bool,
    phase: PlayStatus,
    input_route: InputRoute,
    learned_note: Option<u8>,
    /// Set while the sounding note came from the grid, so sub-step
    /// arpeggiator ticks never override a programmed note
    grid_step_sounding: bool,
}

impl TrackModel {
    pub fn new(id: TrackId, name: impl Into<String>, grid: StepGrid) -> Self {
        Self {
            id,
            name: name.into(),
            grid,
            arp: Arpeggiator::default(),
            recorder: None,
            device: DeviceId(0),
            channel: 0,
            note: 36,
            velocity: 127,
            muted: false,
            phase: PlayStatus::Stopped,
            input_route: InputRoute::Normal,
            learned_note: None,
            grid_step_sounding: false,
        }
    }

    /// Turn this into a looper track
    pub fn with_recorder(mut self) -> Self {
        self.recorder = Some(LoopRecorder::new());
        self
    }

    pub fn with_arpeggiator(mut self, arp: Arpeggiator) -> Self {
        self.arp = arp;
        self
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity.min(MAX_PITCH);
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &StepGrid {
        &self.grid
    }

    pub fn arpeggiator(&self) -> &Arpeggiator {
        &self.arp
    }

    pub fn recorder(&self) -> Option<&LoopRecorder> {
        self.recorder.as_ref()
    }

    pub fn is_looper(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn phase(&self) -> PlayStatus {
        self.phase
    }

    pub fn input_route(&self) -> InputRoute {
        self.input_route
    }

    pub fn learned_note(&self) -> Option<u8> {
        self.learned_note
    }

    // ------------------------------------------------------------------
    // Mutators. None of these touch the sink; they take effect on the next tick.
    // ------------------------------------------------------------------

    pub fn toggle_step(&mut self, step: usize) -> Result<()> {
        if step >= self.grid.step_count() {
            return Err(SequencerError::invalid(format!(
                "step {step} out of range for track '{}' ({} steps)",
                self.name,
                self.grid.step_count()
            )));
        }
        self.grid.toggle(step, self.note);
        Ok(())
    }

    /// Set the loop length (clamped to the grid). Returns the applied length.
    pub fn set_max_steps(&mut self, steps: usize) -> usize {
        self.grid.set_active_length(steps)
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn set_note(&mut self, note: u8) -> Result<()> {
        self.note = validate_note(note)?;
        Ok(())
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<()> {
        self.channel = validate_channel(channel)?;
        Ok(())
    }

    /// The caller checks that `device` exists on the sink
    pub fn set_device(&mut self, device: DeviceId) {
        self.device = device;
    }

    pub fn set_arp_enabled(&mut self, enabled: bool) {
        self.arp.set_enabled(enabled);
    }

    pub fn select_lane(&mut self, lane: usize) -> Result<()> {
        if lane >= MAX_PARALLEL_NOTES {
            return Err(SequencerError::invalid(format!("lane {lane} out of range")));
        }
        self.grid.select_lane(lane);
        Ok(())
    }

    /// Apply a confirmed instrument choice. Non-looper tracks rewrite their
    /// stored pitches when the note changes; looper tracks keep what was
    /// played in. Returns whether the grid was rewritten.
    pub fn assign_instrument(&mut self, device: DeviceId, channel: u8, note: u8) -> Result<bool> {
        let channel = validate_channel(channel)?;
        let note = validate_note(note)?;
        let note_changed = note != self.note;

        self.device = device;
        self.channel = channel;
        self.note = note;

        if note_changed && !self.is_looper() {
            self.grid.rewrite_active_slots(note);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn begin_note_learn(&mut self) {
        self.input_route = InputRoute::NoteLearn;
        self.learned_note = None;
    }

    /// Restore normal input routing, returning the learned pitch if any
    pub fn end_note_learn(&mut self) -> Option<u8> {
        self.input_route = InputRoute::Normal;
        self.learned_note.take()
    }

    // ------------------------------------------------------------------
    // Real-time path
    // ------------------------------------------------------------------

    /// Play the step under the cursor, then move the cursor on.
    ///
    /// Sounding notes are closed right before the next note-on, or at the
    /// next tick once the track is muted. `voices` is shared by every track
    /// so a voice another track holds is released before it is reused.
    pub fn advance(&mut self, transport_step: usize, voices: &mut NoteLifetime, sink: &mut dyn NoteSink) {
        let step = self.grid.cursor();

        if self.muted {
            voices.close_owned(sink, self.id);
            self.grid_step_sounding = false;
        } else if self.grid.current_slot().is_active() {
            let slot = *self.grid.current_slot();
            voices.close_owned(sink, self.id);
            for pitch in slot.notes() {
                self.open(voices, sink, pitch);
            }
            if let Some(root) = slot.notes().next() {
                self.arp.reload(root);
            }
            self.grid_step_sounding = true;
            trace!(track = self.id.0, transport_step, step, "Grid step fired");
        } else {
            self.grid_step_sounding = false;
            self.play_arp(voices, sink);
        }

        self.grid.advance_cursor();
    }

    /// Sub-step tick: the arpeggiator may replace the sounding note unless
    /// the current step was programmed
    pub fn arp_tick(&mut self, voices: &mut NoteLifetime, sink: &mut dyn NoteSink) {
        if !self.phase.is_running() || self.muted || self.grid_step_sounding {
            return;
        }
        self.play_arp(voices, sink);
    }

    fn play_arp(&mut self, voices: &mut NoteLifetime, sink: &mut dyn NoteSink) {
        if let Some(pitch) = self.arp.next() {
            voices.close_owned(sink, self.id);
            self.open(voices, sink, pitch);
        }
    }

    fn voice(&self, pitch: u8) -> OpenNote {
        OpenNote { owner: self.id, device: self.device, channel: self.channel, pitch }
    }

    fn open(&self, voices: &mut NoteLifetime, sink: &mut dyn NoteSink, pitch: u8) {
        voices.open(sink, self.voice(pitch), self.velocity);
    }

    /// Called once per transport phase edge
    pub fn enter_phase(&mut self, phase: PlayStatus, voices: &mut NoteLifetime, sink: &mut dyn NoteSink) {
        let previous = std::mem::replace(&mut self.phase, phase);

        match phase {
            PlayStatus::Stopped => {
                self.grid.reset_cursor();
                voices.close_owned(sink, self.id);
                self.grid_step_sounding = false;
                self.finalize_recording();
            }
            PlayStatus::Playing => {
                if previous == PlayStatus::Recording {
                    self.finalize_recording();
                }
            }
            PlayStatus::Paused => {
                voices.close_owned(sink, self.id);
                self.grid_step_sounding = false;
            }
            PlayStatus::Recording => {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.arm();
                    info!(track = self.id.0, name = %self.name, "Loop recording armed");
                }
            }
        }
    }

    fn finalize_recording(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if recorder.is_armed() {
            let captured = recorder.finalize();
            info!(track = self.id.0, name = %self.name, captured, "Loop recording finished");
        }
    }

    /// Handle a note from the external MIDI input
    pub fn receive_external(&mut self, msg: &MidiMessage, voices: &mut NoteLifetime, sink: &mut dyn NoteSink) {
        if self.input_route == InputRoute::NoteLearn {
            if msg.starts_note() {
                self.learned_note = Some(msg.pitch);
                debug!(track = self.id.0, pitch = msg.pitch, "Learned note");
            }
            return;
        }

        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };

        if !msg.starts_note() {
            voices.close(sink, self.voice(msg.pitch));
            return;
        }

        if self.phase != PlayStatus::Recording {
            return;
        }
        let Some(step) = recorder.capture(&mut self.grid, msg) else {
            return;
        };
        debug!(track = self.id.0, step, pitch = msg.pitch, "Recorded note");

        if !self.muted {
            voices.open(sink, self.voice(msg.pitch), msg.velocity);
        }
    }

    pub fn render_state(&self) -> TrackRenderState {
        TrackRenderState {
            name: self.name.clone(),
            cursor: self.grid.cursor(),
            active: self.grid.active_flags(),
            max_step: self.grid.active_length(),
            steps_per_beat: self.grid.steps_per_beat(),
            muted: self.muted,
            looper: self.is_looper(),
            recording: self.recorder.as_ref().is_some_and(LoopRecorder::is_armed),
            learning: self.input_route == InputRoute::NoteLearn,
            arp_enabled: self.arp.is_enabled(),
            device: self.device,
            channel: self.channel,
            note: self.note,
        }
    }
}

pub(crate) fn validate_channel(channel: u8) -> Result<u8> {
    if channel > MAX_CHANNEL {
        return Err(SequencerError::invalid(format!("channel {channel} out of range 0..={MAX_CHANNEL}")));
    }
    Ok(channel)
}

pub(crate) fn validate_note(note: u8) -> Result<u8> {
    if note > MAX_PITCH {
        return Err(SequencerError::invalid(format!("note {note} out of range 0..={MAX_PITCH}")));
    }
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CapturingSink, SinkEvent};

    fn track(steps: usize) -> TrackModel {
        let mut t = TrackModel::new(TrackId(0), "kick", StepGrid::new(steps, 4));
        t.set_channel(9).unwrap();
        t
    }

    fn on(pitch: u8) -> SinkEvent {
        SinkEvent::NoteOn { device: DeviceId(0), channel: 9, pitch, velocity: 127 }
    }

    fn off(pitch: u8) -> SinkEvent {
        SinkEvent::NoteOff { device: DeviceId(0), channel: 9, pitch }
    }

    #[test]
    fn test_advance_holds_note_until_next() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(4);
        t.set_note(36).unwrap();
        t.toggle_step(0).unwrap();
        t.set_note(38).unwrap();
        t.toggle_step(2).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);

        let per_tick: Vec<Vec<SinkEvent>> = (0..5)
            .map(|i| {
                t.advance(i, &mut voices, &mut sink);
                sink.take_events()
            })
            .collect();

        assert_eq!(per_tick[0], vec![on(36)]);
        assert!(per_tick[1].is_empty());
        assert_eq!(per_tick[2], vec![off(36), on(38)]);
        assert!(per_tick[3].is_empty());
        assert_eq!(per_tick[4], vec![off(38), on(36)]);
    }

    #[test]
    fn test_mute_releases_and_silences() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(2);
        t.toggle_step(0).unwrap();
        t.toggle_step(1).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        t.advance(0, &mut voices, &mut sink);
        sink.take_events();

        t.set_mute(true);
        t.set_mute(true);
        assert!(sink.events().is_empty());
        t.advance(1, &mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(36)]);
        t.advance(0, &mut voices, &mut sink);
        assert!(sink.take_events().is_empty());
        assert_eq!(t.grid().cursor(), 1);
    }

    #[test]
    fn test_stop_edge_closes_notes_and_rewinds() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(8);
        t.toggle_step(0).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        t.advance(0, &mut voices, &mut sink);
        t.advance(1, &mut voices, &mut sink);
        t.enter_phase(PlayStatus::Stopped, &mut voices, &mut sink);
        assert!(voices.is_empty());
        assert_eq!(t.grid().cursor(), 0);
        assert_eq!(sink.events().last(), Some(&off(36)));
    }

    #[test]
    fn test_arp_restarts_on_grid_step() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(4);
        t.set_arp_enabled(true);
        t.set_note(48).unwrap();
        t.toggle_step(0).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);

        t.advance(0, &mut voices, &mut sink);
        sink.take_events();
        t.advance(1, &mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(48), on(51)]);
        t.advance(2, &mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(51), on(53)]);
        t.advance(3, &mut voices, &mut sink);
        t.advance(0, &mut voices, &mut sink);
        sink.take_events();
        t.advance(1, &mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(48), on(51)]);
    }

    #[test]
    fn test_arp_tick_skips_programmed_step() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(4);
        t.set_arp_enabled(true);
        t.toggle_step(0).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        t.advance(0, &mut voices, &mut sink);
        sink.take_events();

        t.arp_tick(&mut voices, &mut sink);
        assert!(sink.events().is_empty());

        t.advance(1, &mut voices, &mut sink);
        sink.take_events();
        t.arp_tick(&mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(39), on(41)]);
    }

    #[test]
    fn test_shared_voice_released_across_tracks() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut kick = track(4);
        kick.set_arp_enabled(true);
        kick.toggle_step(0).unwrap();
        let mut clap = TrackModel::new(TrackId(1), "clap", StepGrid::new(4, 4));
        clap.set_channel(9).unwrap();
        clap.set_note(39).unwrap();
        clap.toggle_step(1).unwrap();
        for t in [&mut kick, &mut clap] {
            t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        }

        for step in 0..2 {
            kick.advance(step, &mut voices, &mut sink);
            clap.advance(step, &mut voices, &mut sink);
        }
        // the kick arpeggio reaches 39 just before the clap fires the same voice
        assert_eq!(sink.take_events(), vec![on(36), off(36), on(39), off(39), on(39)]);
        assert_eq!(voices.owned_by(TrackId(1)).count(), 1);
        assert_eq!(voices.owned_by(TrackId(0)).count(), 0);

        kick.arp_tick(&mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![on(41)]);
    }

    #[test]
    fn test_toggle_out_of_range_rejected() {
        let mut t = track(8);
        assert!(matches!(t.toggle_step(8), Err(SequencerError::InvalidCommand(_))));
    }

    #[test]
    fn test_assignment_validation() {
        let mut t = track(8);
        assert!(t.set_channel(16).is_err());
        assert!(t.set_note(128).is_err());
        assert_eq!(t.channel(), 9);
        assert!(t.assign_instrument(DeviceId(0), 3, 200).is_err());
        assert_eq!(t.note(), 36);
    }

    #[test]
    fn test_assign_instrument_rewrites_non_looper() {
        let mut t = track(8);
        t.toggle_step(1).unwrap();
        t.toggle_step(5).unwrap();
        assert!(t.assign_instrument(DeviceId(0), 9, 50).unwrap());
        assert_eq!(t.grid().slot(1).unwrap().note(0), Some(50));
        assert_eq!(t.grid().slot(5).unwrap().note(0), Some(50));
        assert!(!t.assign_instrument(DeviceId(0), 9, 50).unwrap());
    }

    #[test]
    fn test_assign_instrument_keeps_looper_notes() {
        let mut t = track(8).with_recorder();
        t.toggle_step(1).unwrap();
        assert!(!t.assign_instrument(DeviceId(0), 9, 50).unwrap());
        assert_eq!(t.grid().slot(1).unwrap().note(0), Some(36));
        assert_eq!(t.note(), 50);
    }

    #[test]
    fn test_looper_records_on_step_after_last_fired_and_monitors() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(8).with_recorder();
        t.enter_phase(PlayStatus::Recording, &mut voices, &mut sink);
        t.advance(0, &mut voices, &mut sink);
        assert_eq!(t.grid().cursor(), 1);

        // step 0 already fired, so the note lands on the upcoming step
        t.receive_external(&MidiMessage::note_on(0, 60, 90), &mut voices, &mut sink);
        assert!(!t.grid().is_active(0));
        assert!(t.grid().is_active(1));
        assert_eq!(
            sink.take_events(),
            vec![SinkEvent::NoteOn { device: DeviceId(0), channel: 9, pitch: 60, velocity: 90 }]
        );

        t.receive_external(&MidiMessage::note_off(0, 60), &mut voices, &mut sink);
        assert_eq!(sink.take_events(), vec![off(60)]);
        assert!(voices.is_empty());
    }

    #[test]
    fn test_looper_ignores_input_when_not_recording() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(8).with_recorder();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        t.receive_external(&MidiMessage::note_on(0, 60, 90), &mut voices, &mut sink);
        assert!(!t.grid().is_active(0));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_recording_survives_switch_to_playback() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(8).with_recorder();
        t.enter_phase(PlayStatus::Recording, &mut voices, &mut sink);
        t.receive_external(&MidiMessage::note_on(0, 60, 90), &mut voices, &mut sink);
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        assert!(!t.recorder().unwrap().is_armed());
        assert!(t.grid().is_active(0));
    }

    #[test]
    fn test_note_learn_captures_pitch() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        let mut t = track(8).with_recorder();
        t.enter_phase(PlayStatus::Recording, &mut voices, &mut sink);
        t.begin_note_learn();
        t.receive_external(&MidiMessage::note_on(0, 50, 100), &mut voices, &mut sink);
        assert!(!t.grid().is_active(0));
        assert!(sink.events().is_empty());
        assert_eq!(t.end_note_learn(), Some(50));
        assert_eq!(t.input_route(), InputRoute::Normal);
    }

    #[test]
    fn test_unavailable_device_keeps_ticking() {
        let mut sink = CapturingSink::new(1);
        let mut voices = NoteLifetime::new();
        sink.set_unavailable(DeviceId(0), true);
        let mut t = track(4);
        t.toggle_step(0).unwrap();
        t.enter_phase(PlayStatus::Playing, &mut voices, &mut sink);
        for i in 0..6 {
            t.advance(i, &mut voices, &mut sink);
        }
        assert!(voices.is_empty());
        assert_eq!(t.grid().cursor(), 2);
    }
}
